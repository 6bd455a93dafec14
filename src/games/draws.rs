//! Draw lifecycle: scheduling, result publication, cancellation with refunds

use crate::common::clock::Clock;
use crate::common::reference::{ReferenceGenerator, ReferenceKind};
use crate::common::types::{BetId, DrawId, LottoNumber};
use crate::errors::{DrawError, LottoError, LottoResult, StorageError};
use crate::games::types::{Draw, DrawStatus};
use crate::ledger::with_fresh_reference;
use crate::storage::{CommitOutcome, RefundUnit, Store};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of cancelling a draw
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CancellationReport {
    pub draw_id: DrawId,
    pub refunded_bets: usize,
    pub refunded_amount: Decimal,
    /// Bets that left `active` before their refund could apply
    pub conflicts: usize,
}

pub struct DrawLifecycle {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    references: Arc<ReferenceGenerator>,
    reference_retry_limit: u32,
}

impl DrawLifecycle {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        references: Arc<ReferenceGenerator>,
        reference_retry_limit: u32,
    ) -> Self {
        Self {
            store,
            clock,
            references,
            reference_retry_limit,
        }
    }

    async fn require(&self, draw_id: DrawId) -> LottoResult<Draw> {
        self.store.get_draw(draw_id).await?.ok_or_else(|| {
            StorageError::NotFound {
                entity: "draw",
                id: draw_id,
            }
            .into()
        })
    }

    async fn transition(&self, draw_id: DrawId, next: DrawStatus) -> LottoResult<Draw> {
        let draw = self.require(draw_id).await?;
        if !draw.status.can_transition_to(next) {
            return Err(illegal(draw_id, draw.status, next).into());
        }
        let draw = self.store.transition_draw(draw_id, draw.status, next).await?;
        info!(draw_id, status = %next, "draw transitioned");
        Ok(draw)
    }

    pub async fn open(&self, draw_id: DrawId) -> LottoResult<Draw> {
        self.transition(draw_id, DrawStatus::Open).await
    }

    pub async fn close(&self, draw_id: DrawId) -> LottoResult<Draw> {
        self.transition(draw_id, DrawStatus::Closed).await
    }

    pub async fn begin_drawing(&self, draw_id: DrawId) -> LottoResult<Draw> {
        self.transition(draw_id, DrawStatus::Drawing).await
    }

    /// Open scheduled draws whose window has started and close open draws
    /// whose window has ended. Returns the number of transitions applied.
    /// A draw another caller moved first is skipped.
    pub async fn advance_schedule(&self) -> LottoResult<usize> {
        let now = self.clock.now();
        let mut transitions = 0;

        for draw in self.store.list_draws().await? {
            let mut status = draw.status;
            if status == DrawStatus::Scheduled && draw.opens_at <= now {
                if !self.scheduled_step(&draw, status, DrawStatus::Open).await? {
                    continue;
                }
                info!(draw_id = draw.id, draw_number = %draw.draw_number, "draw opened for betting");
                status = DrawStatus::Open;
                transitions += 1;
            }
            if status == DrawStatus::Open
                && draw.closes_at <= now
                && self.scheduled_step(&draw, status, DrawStatus::Closed).await?
            {
                info!(draw_id = draw.id, draw_number = %draw.draw_number, "draw closed for betting");
                transitions += 1;
            }
        }
        Ok(transitions)
    }

    /// `false` when the draw had already left `from`.
    async fn scheduled_step(&self, draw: &Draw, from: DrawStatus, to: DrawStatus) -> LottoResult<bool> {
        match self.store.transition_draw(draw.id, from, to).await {
            Ok(_) => Ok(true),
            Err(LottoError::Draw(DrawError::IllegalTransition { from: current, .. })) => {
                debug!(draw_id = draw.id, status = %current, target = %to, "draw already moved");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Attach winning numbers and complete the draw. A closed draw passes
    /// through `drawing` first.
    pub async fn publish_results(&self, draw_id: DrawId, winning_numbers: Vec<LottoNumber>) -> LottoResult<Draw> {
        let mut draw = self.require(draw_id).await?;
        let game = self.store.get_game(draw.game_id).await?.ok_or(StorageError::NotFound {
            entity: "game",
            id: draw.game_id,
        })?;

        if winning_numbers.is_empty() {
            return Err(invalid_numbers(draw_id, "no numbers given".to_string()).into());
        }
        let mut seen = HashSet::with_capacity(winning_numbers.len());
        for &number in &winning_numbers {
            if !game.contains_number(number) {
                return Err(invalid_numbers(
                    draw_id,
                    format!(
                        "{} is outside {}..={}",
                        number, game.number_range_start, game.number_range_end
                    ),
                )
                .into());
            }
            if !seen.insert(number) {
                return Err(invalid_numbers(draw_id, format!("{} drawn twice", number)).into());
            }
        }

        if draw.status == DrawStatus::Closed {
            draw = self
                .store
                .transition_draw(draw_id, DrawStatus::Closed, DrawStatus::Drawing)
                .await?;
        }
        if draw.status != DrawStatus::Drawing {
            return Err(illegal(draw_id, draw.status, DrawStatus::Completed).into());
        }

        let draw = self
            .store
            .complete_draw(draw_id, DrawStatus::Drawing, winning_numbers)
            .await?;
        info!(draw_id, winning_numbers = ?draw.winning_numbers, "draw results published");
        Ok(draw)
    }

    /// Cancel a draw and refund every active bet. Re-running on a cancelled
    /// draw refunds whatever is still active.
    pub async fn cancel_draw(&self, draw_id: DrawId) -> LottoResult<CancellationReport> {
        let draw = self.require(draw_id).await?;
        if draw.status != DrawStatus::Cancelled {
            if !draw.status.can_transition_to(DrawStatus::Cancelled) {
                return Err(illegal(draw_id, draw.status, DrawStatus::Cancelled).into());
            }
            self.store
                .transition_draw(draw_id, draw.status, DrawStatus::Cancelled)
                .await?;
        }

        let mut report = CancellationReport {
            draw_id,
            ..Default::default()
        };
        let now = self.clock.now();

        for bet in self.store.active_bets_for_draw(draw_id).await? {
            let outcome = with_fresh_reference(
                &self.references,
                ReferenceKind::Refund,
                self.reference_retry_limit,
                |reference| {
                    self.store.commit_refund(RefundUnit {
                        bet_id: bet.id,
                        reference,
                        processed_at: now,
                    })
                },
            )
            .await?;

            match outcome {
                CommitOutcome::Applied { .. } => {
                    report.refunded_bets += 1;
                    report.refunded_amount += bet.stake_amount;
                    debug!(bet_id = bet.id, user_id = bet.user_id, amount = %bet.stake_amount, "stake refunded");
                }
                CommitOutcome::Conflict { current } => {
                    report.conflicts += 1;
                    debug!(bet_id = bet.id, status = %current, "refund skipped, bet no longer active");
                }
            }
        }

        info!(
            draw_id,
            refunded = report.refunded_bets,
            amount = %report.refunded_amount,
            "draw cancelled"
        );
        Ok(report)
    }

    /// Record that a won bet's winnings were paid out.
    pub async fn mark_paid(&self, bet_id: BetId) -> LottoResult<CommitOutcome> {
        let outcome = self.store.commit_payout_mark(bet_id, self.clock.now()).await?;
        if let CommitOutcome::Conflict { current } = &outcome {
            warn!(bet_id, status = %current, "only won bets can be marked paid");
        }
        Ok(outcome)
    }
}

fn illegal(draw: DrawId, from: DrawStatus, to: DrawStatus) -> DrawError {
    DrawError::IllegalTransition {
        draw,
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn invalid_numbers(draw: DrawId, reason: String) -> DrawError {
    DrawError::InvalidWinningNumbers { draw, reason }
}
