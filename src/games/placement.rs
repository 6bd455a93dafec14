//! Bet placement: validation, valuation and the stake debit

use crate::common::clock::Clock;
use crate::common::reference::{ReferenceGenerator, ReferenceKind};
use crate::common::types::{BetTypeId, DrawId, LottoNumber, UserId};
use crate::errors::{LottoResult, PlacementError, StorageError};
use crate::games::odds::OddsTable;
use crate::games::types::{Bet, BetTypeDefinition, DrawStatus, GameDefinition};
use crate::games::valuation::potential_winnings;
use crate::ledger::with_fresh_reference;
use crate::storage::{NewBet, PlacementUnit, Store};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceBetRequest {
    pub user_id: UserId,
    pub draw_id: DrawId,
    pub bet_type_id: BetTypeId,
    pub selected_numbers: Vec<LottoNumber>,
    pub stake_amount: Decimal,
}

/// Check a selection against the bet type's and game's bounds.
pub fn validate_selection(
    game: &GameDefinition,
    bet_type: &BetTypeDefinition,
    selected_numbers: &[LottoNumber],
) -> Result<(), PlacementError> {
    let min = bet_type.min_numbers_required.max(game.min_numbers);
    let max = bet_type.max_numbers_allowed.min(game.max_numbers);
    let count = selected_numbers.len();
    if count < min as usize || count > max as usize {
        return Err(PlacementError::WrongNumberCount { count, min, max });
    }

    let mut seen = HashSet::with_capacity(count);
    for &number in selected_numbers {
        if !game.contains_number(number) {
            return Err(PlacementError::NumberOutOfRange {
                number,
                start: game.number_range_start,
                end: game.number_range_end,
            });
        }
        if !seen.insert(number) {
            return Err(PlacementError::DuplicateNumber(number));
        }
    }
    Ok(())
}

pub fn validate_stake(game: &GameDefinition, stake_amount: Decimal) -> Result<(), PlacementError> {
    if stake_amount <= Decimal::ZERO || stake_amount < game.min_stake || stake_amount > game.max_stake {
        return Err(PlacementError::StakeOutOfBounds {
            stake: stake_amount,
            min: game.min_stake,
            max: game.max_stake,
        });
    }
    Ok(())
}

/// Accepts bets against open draws
pub struct BetPlacement {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    references: Arc<ReferenceGenerator>,
    reference_retry_limit: u32,
}

impl BetPlacement {
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

    pub async fn place(&self, request: PlaceBetRequest) -> LottoResult<Bet> {
        let now = self.clock.now();
        let draw = self.store.get_draw(request.draw_id).await?.ok_or(StorageError::NotFound {
            entity: "draw",
            id: request.draw_id,
        })?;
        if draw.status != DrawStatus::Open {
            return Err(PlacementError::DrawNotOpen(draw.id).into());
        }
        if !draw.accepts_bets_at(now) {
            return Err(PlacementError::OutsideBettingWindow(draw.id).into());
        }

        let game = self.store.get_game(draw.game_id).await?.ok_or(StorageError::NotFound {
            entity: "game",
            id: draw.game_id,
        })?;
        if !game.is_active {
            return Err(PlacementError::GameInactive(game.id).into());
        }
        let bet_type = self
            .store
            .get_bet_type(request.bet_type_id)
            .await?
            .ok_or(StorageError::NotFound {
                entity: "bet type",
                id: request.bet_type_id,
            })?;
        if !bet_type.is_active {
            return Err(PlacementError::BetTypeInactive(bet_type.id).into());
        }

        validate_selection(&game, &bet_type, &request.selected_numbers)?;
        validate_stake(&game, request.stake_amount)?;

        let odds = OddsTable::from_entries(self.store.odds_for_game(game.id).await?);
        let potential = potential_winnings(
            &odds,
            request.stake_amount,
            &game,
            &bet_type,
            &request.selected_numbers,
        )?;

        let placed = with_fresh_reference(
            &self.references,
            ReferenceKind::Stake,
            self.reference_retry_limit,
            |stake_reference| {
                let unit = PlacementUnit {
                    bet: NewBet {
                        bet_number: self.references.next(ReferenceKind::Bet),
                        user_id: request.user_id,
                        draw_id: request.draw_id,
                        bet_type_id: request.bet_type_id,
                        selected_numbers: request.selected_numbers.clone(),
                        stake_amount: request.stake_amount,
                        potential_winnings: potential,
                        placed_at: now,
                    },
                    stake_reference,
                };
                self.store.commit_placement(unit)
            },
        )
        .await?;

        info!(
            bet_id = placed.bet.id,
            user_id = placed.bet.user_id,
            draw_id = placed.bet.draw_id,
            amount = %placed.bet.stake_amount,
            potential = %placed.bet.potential_winnings,
            "bet placed"
        );
        Ok(placed.bet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::common::clock::ManualClock;
    use crate::errors::LottoError;
    use crate::games::types::{BetStatus, Draw};
    use crate::ledger::TransactionType;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        placement: BetPlacement,
    }

    async fn harness() -> Harness {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let store = Arc::new(MemoryStore::new());
        Catalog::standard().seed(store.as_ref()).await.unwrap();

        let mut draw = Draw::scheduled(1, "NLA-0001", 1, now - Duration::hours(1), now + Duration::hours(1));
        draw.status = DrawStatus::Open;
        store.insert_draw(draw).await.unwrap();
        store.open_account(1, dec!(100.00)).await.unwrap();

        let clock = Arc::new(ManualClock::new(now));
        let references = Arc::new(ReferenceGenerator::new(clock.clone(), Box::new(StdRng::seed_from_u64(11))));
        let placement = BetPlacement::new(store.clone(), clock.clone(), references, 1);
        Harness { store, clock, placement }
    }

    fn request(bet_type_id: BetTypeId, numbers: Vec<LottoNumber>, stake: Decimal) -> PlaceBetRequest {
        PlaceBetRequest {
            user_id: 1,
            draw_id: 1,
            bet_type_id,
            selected_numbers: numbers,
            stake_amount: stake,
        }
    }

    fn placement_error(err: LottoError) -> PlacementError {
        match err {
            LottoError::Placement(e) => e,
            other => panic!("expected placement error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_place_direct_one() {
        let h = harness().await;
        let bet = h.placement.place(request(1, vec![42], dec!(10.00))).await.unwrap();

        assert_eq!(bet.status, BetStatus::Active);
        assert_eq!(bet.potential_winnings, dec!(400.00));
        assert!(bet.bet_number.starts_with("BET20240501120000"));
        assert_eq!(h.store.get_balance(1).await.unwrap(), dec!(90.00));

        let entries = h.store.ledger_for_bet(bet.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, TransactionType::Stake);
        assert_eq!(entries[0].balance_before, dec!(100.00));
        assert_eq!(entries[0].balance_after, dec!(90.00));

        let draw = h.store.get_draw(1).await.unwrap().unwrap();
        assert_eq!(draw.total_bets, 1);
        assert_eq!(draw.total_stake_amount, dec!(10.00));
    }

    #[tokio::test]
    async fn test_duplicates_rejected() {
        let h = harness().await;
        let err = h.placement.place(request(2, vec![5, 5], dec!(10.00))).await.unwrap_err();
        assert_eq!(placement_error(err), PlacementError::DuplicateNumber(5));
        assert_eq!(h.store.get_balance(1).await.unwrap(), dec!(100.00));
    }

    #[tokio::test]
    async fn test_wrong_count_and_range() {
        let h = harness().await;
        let err = h.placement.place(request(2, vec![5], dec!(10.00))).await.unwrap_err();
        assert!(matches!(placement_error(err), PlacementError::WrongNumberCount { count: 1, .. }));

        let err = h.placement.place(request(1, vec![91], dec!(10.00))).await.unwrap_err();
        assert!(matches!(placement_error(err), PlacementError::NumberOutOfRange { number: 91, .. }));
    }

    #[tokio::test]
    async fn test_stake_bounds_and_funds() {
        let h = harness().await;
        let err = h.placement.place(request(1, vec![7], Decimal::ZERO)).await.unwrap_err();
        assert!(matches!(placement_error(err), PlacementError::StakeOutOfBounds { .. }));

        h.store.debit(1, dec!(95.00)).await.unwrap();
        let err = h.placement.place(request(1, vec![7], dec!(10.00))).await.unwrap_err();
        assert!(matches!(placement_error(err), PlacementError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_closed_window_rejected() {
        let h = harness().await;
        h.clock.advance(Duration::hours(2));
        let err = h.placement.place(request(1, vec![7], dec!(10.00))).await.unwrap_err();
        assert_eq!(placement_error(err), PlacementError::OutsideBettingWindow(1));
    }

    #[tokio::test]
    async fn test_inactive_game_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut catalog = Catalog::standard();
        catalog.games[0].is_active = false;
        catalog.seed(store.as_ref()).await.unwrap();

        let mut draw = Draw::scheduled(1, "NLA-0001", 1, now - Duration::hours(1), now + Duration::hours(1));
        draw.status = DrawStatus::Open;
        store.insert_draw(draw).await.unwrap();
        store.open_account(1, dec!(100.00)).await.unwrap();

        let clock = Arc::new(ManualClock::new(now));
        let references = Arc::new(ReferenceGenerator::new(clock.clone(), Box::new(StdRng::seed_from_u64(12))));
        let placement = BetPlacement::new(store.clone(), clock, references, 1);

        let err = placement.place(request(1, vec![42], dec!(10.00))).await.unwrap_err();
        assert_eq!(placement_error(err), PlacementError::GameInactive(1));
        assert_eq!(store.get_balance(1).await.unwrap(), dec!(100.00));
        assert!(store.ledger_for_user(1).await.unwrap().is_empty());
    }

    #[test]
    fn test_selection_bounds_intersect_game_bounds() {
        let catalog = Catalog::standard();
        let game = &catalog.games[0];
        let against = catalog.bet_types.iter().find(|b| b.key == "against").unwrap();

        assert!(validate_selection(game, against, &[1, 2, 3, 4, 5]).is_ok());
        assert_eq!(
            validate_selection(game, against, &[1, 2, 3, 4, 5, 6]),
            Err(PlacementError::WrongNumberCount { count: 6, min: 1, max: 5 })
        );
    }
}
