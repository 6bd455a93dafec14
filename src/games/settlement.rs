//! Settlement orchestration
//!
//! Resolves every active bet of a completed draw through the matching
//! engine and commits each outcome as its own atomic storage unit. Units
//! run with bounded concurrency; a failure in one bet never stops its
//! siblings, and the bet stays `active` for the next pass.
//!
//! Settling is safe to repeat and safe to race: the store only applies a
//! unit while the bet is still `active`, so a second settler gets a
//! conflict instead of a second credit.

use crate::common::clock::Clock;
use crate::common::reference::{ReferenceGenerator, ReferenceKind};
use crate::common::types::{BetId, BetTypeId, DrawId, LottoNumber};
use crate::config::LottoConfig;
use crate::errors::{LottoResult, StorageError};
use crate::games::events::{EventSink, SettlementEvent};
use crate::games::matching::{actual_winnings, evaluate_for_bet_type};
use crate::games::odds::OddsTable;
use crate::games::types::{Bet, BetOutcome, BetStatus, BetTypeDefinition, DrawStatus, GameDefinition};
use crate::ledger::with_fresh_reference;
use crate::storage::{CommitOutcome, SettlementUnit, Store};
use dashmap::DashSet;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a draw was not settled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SkipReason {
    DrawNotFound,
    NotCompleted { status: DrawStatus },
    NoWinningNumbers,
}

/// One bet that could not be settled in this pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BetFailure {
    pub bet_id: BetId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettlementSummary {
    pub draw_id: DrawId,
    pub bets_considered: usize,
    pub winners: usize,
    pub losers: usize,
    /// Bets another settler got to first
    pub conflicts: usize,
    pub failures: Vec<BetFailure>,
    pub payout_this_pass: Decimal,
    /// Draw-wide payout after this pass
    pub total_payout_amount: Decimal,
}

/// Structured result of `settle_draw`; skipping is not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DrawSettlement {
    Skipped { draw_id: DrawId, reason: SkipReason },
    Settled(SettlementSummary),
}

impl DrawSettlement {
    pub fn summary(&self) -> Option<&SettlementSummary> {
        match self {
            DrawSettlement::Settled(summary) => Some(summary),
            DrawSettlement::Skipped { .. } => None,
        }
    }
}

enum Resolution {
    Won(Decimal),
    Lost,
    Conflict,
}

/// Everything a pass over one draw reads once
struct DrawContext {
    draw_id: DrawId,
    game: GameDefinition,
    odds: OddsTable,
    bet_types: HashMap<BetTypeId, BetTypeDefinition>,
    winning_numbers: Vec<LottoNumber>,
}

/// Removes a bet from the in-flight set when its unit finishes.
struct Claim<'a> {
    in_flight: &'a DashSet<BetId>,
    bet_id: BetId,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.bet_id);
    }
}

pub struct SettlementEngine {
    store: Arc<dyn Store>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    references: Arc<ReferenceGenerator>,
    max_concurrent_units: usize,
    reference_retry_limit: u32,
    strict_direct_five: bool,
    in_flight: DashSet<BetId>,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        references: Arc<ReferenceGenerator>,
        config: &LottoConfig,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            references,
            max_concurrent_units: config.settlement.max_concurrent_units.max(1),
            reference_retry_limit: config.settlement.reference_retry_limit,
            strict_direct_five: config.matching.strict_direct_five,
            in_flight: DashSet::new(),
        }
    }

    /// Settle every active bet of a completed draw.
    pub async fn settle_draw(&self, draw_id: DrawId) -> LottoResult<DrawSettlement> {
        let Some(draw) = self.store.get_draw(draw_id).await? else {
            warn!(draw_id, "settlement skipped: draw not found");
            return Ok(skipped(draw_id, SkipReason::DrawNotFound));
        };
        if draw.status != DrawStatus::Completed {
            warn!(draw_id, status = %draw.status, "settlement skipped: draw not completed");
            return Ok(skipped(draw_id, SkipReason::NotCompleted { status: draw.status }));
        }
        let Some(winning_numbers) = draw.settleable_numbers().map(<[LottoNumber]>::to_vec) else {
            warn!(draw_id, "settlement skipped: no winning numbers");
            return Ok(skipped(draw_id, SkipReason::NoWinningNumbers));
        };

        let game = self.store.get_game(draw.game_id).await?.ok_or(StorageError::NotFound {
            entity: "game",
            id: draw.game_id,
        })?;
        let odds = OddsTable::from_entries(self.store.odds_for_game(game.id).await?);
        let bets = self.store.active_bets_for_draw(draw_id).await?;

        let mut bet_types = HashMap::new();
        for bet in &bets {
            if bet_types.contains_key(&bet.bet_type_id) {
                continue;
            }
            if let Some(bet_type) = self.store.get_bet_type(bet.bet_type_id).await? {
                bet_types.insert(bet.bet_type_id, bet_type);
            }
        }

        let ctx = DrawContext {
            draw_id,
            game,
            odds,
            bet_types,
            winning_numbers,
        };

        info!(draw_id, active_bets = bets.len(), "settling draw");

        let mut summary = SettlementSummary {
            draw_id,
            bets_considered: bets.len(),
            ..Default::default()
        };

        let units: Vec<_> = bets.into_iter().map(|bet| self.settle_bet(&ctx, bet)).collect();
        let results: Vec<(BetId, LottoResult<Resolution>)> = stream::iter(units)
            .buffer_unordered(self.max_concurrent_units)
            .collect()
            .await;

        for (bet_id, result) in results {
            match result {
                Ok(Resolution::Won(amount)) => {
                    summary.winners += 1;
                    summary.payout_this_pass += amount;
                }
                Ok(Resolution::Lost) => summary.losers += 1,
                Ok(Resolution::Conflict) => summary.conflicts += 1,
                Err(e) => {
                    error!(draw_id, bet_id, error = %e, "bet settlement failed, bet left active");
                    summary.failures.push(BetFailure {
                        bet_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        summary.total_payout_amount = self.refresh_payout_total(draw_id).await?;

        info!(
            draw_id,
            winners = summary.winners,
            losers = summary.losers,
            conflicts = summary.conflicts,
            failures = summary.failures.len(),
            payout = %summary.payout_this_pass,
            total_payout = %summary.total_payout_amount,
            "draw settlement finished"
        );
        Ok(DrawSettlement::Settled(summary))
    }

    /// Safety-net pass: settle completed draws that still have active bets.
    pub async fn settle_pending_draws(&self) -> LottoResult<Vec<DrawSettlement>> {
        let draw_ids = self.store.completed_draws_with_active_bets().await?;
        if !draw_ids.is_empty() {
            info!(draws = draw_ids.len(), "safety-net settlement pass");
        }

        let mut reports = Vec::with_capacity(draw_ids.len());
        for draw_id in draw_ids {
            match self.settle_draw(draw_id).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(draw_id, error = %e, "draw settlement failed"),
            }
        }
        Ok(reports)
    }

    async fn settle_bet(&self, ctx: &DrawContext, bet: Bet) -> (BetId, LottoResult<Resolution>) {
        let bet_id = bet.id;
        if !self.in_flight.insert(bet_id) {
            debug!(draw_id = ctx.draw_id, bet_id, "bet already being settled here");
            return (bet_id, Ok(Resolution::Conflict));
        }
        let _claim = Claim {
            in_flight: &self.in_flight,
            bet_id,
        };
        (bet_id, self.resolve_and_commit(ctx, &bet).await)
    }

    async fn resolve_and_commit(&self, ctx: &DrawContext, bet: &Bet) -> LottoResult<Resolution> {
        let bet_type = ctx.bet_types.get(&bet.bet_type_id).ok_or(StorageError::NotFound {
            entity: "bet type",
            id: bet.bet_type_id,
        })?;

        let result = evaluate_for_bet_type(
            bet_type,
            &bet.selected_numbers,
            Some(ctx.winning_numbers.as_slice()),
            self.strict_direct_five,
        );
        if let Some(reason) = &result.malformed {
            debug!(bet_id = bet.id, %reason, "malformed bet resolved as a loss");
        }

        let winnings = actual_winnings(
            &result,
            bet.stake_amount,
            &ctx.odds,
            ctx.game.id,
            bet_type,
            bet.selected_numbers.len() as u32,
        )?;
        let outcome = if result.won { BetOutcome::Won } else { BetOutcome::Lost };
        let processed_at = self.clock.now();

        let committed = with_fresh_reference(
            &self.references,
            ReferenceKind::Win,
            self.reference_retry_limit,
            |win_reference| {
                self.store.commit_settlement(SettlementUnit {
                    bet_id: bet.id,
                    outcome,
                    actual_winnings: winnings,
                    win_reference,
                    processed_at,
                })
            },
        )
        .await?;

        match committed {
            CommitOutcome::Applied { bet: settled, .. } => {
                self.sink
                    .publish(SettlementEvent {
                        bet_id: settled.id,
                        user_id: settled.user_id,
                        draw_id: settled.draw_id,
                        outcome,
                        amount: settled.actual_winnings,
                    })
                    .await;
                debug!(
                    bet_id = settled.id,
                    user_id = settled.user_id,
                    status = %settled.status,
                    amount = %settled.actual_winnings,
                    "bet settled"
                );
                Ok(match outcome {
                    BetOutcome::Won => Resolution::Won(settled.actual_winnings),
                    BetOutcome::Lost => Resolution::Lost,
                })
            }
            CommitOutcome::Conflict { current } => {
                debug!(bet_id = bet.id, status = %current, "bet already settled elsewhere");
                Ok(Resolution::Conflict)
            }
        }
    }

    /// Recompute the draw's payout from every won or paid bet.
    async fn refresh_payout_total(&self, draw_id: DrawId) -> LottoResult<Decimal> {
        let total: Decimal = self
            .store
            .bets_for_draw(draw_id)
            .await?
            .iter()
            .filter(|bet| matches!(bet.status, BetStatus::Won | BetStatus::Paid))
            .map(|bet| bet.actual_winnings)
            .sum();
        self.store.set_draw_payout_total(draw_id, total).await?;
        Ok(total)
    }
}

fn skipped(draw_id: DrawId, reason: SkipReason) -> DrawSettlement {
    DrawSettlement::Skipped { draw_id, reason }
}
