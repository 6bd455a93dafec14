//! Persistence for the catalog, draws, bets, accounts and the ledger
//!
//! Every balance movement goes through one of the `commit_*` units. A unit
//! applies its bet transition, balance change and ledger entry together or
//! not at all, and re-checks the bet's expected status inside the same
//! critical section so concurrent settlers cannot double-apply.

mod memory;
mod rocks;
mod units;

pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use units::{CommitOutcome, NewBet, Placed, PlacementUnit, RefundUnit, SettlementUnit};

use crate::common::types::{BetId, BetTypeId, DrawId, GameId, LottoNumber, UserId};
use crate::errors::LottoResult;
use crate::games::types::{Bet, BetTypeDefinition, Draw, DrawStatus, GameDefinition, OddsEntry};
use crate::ledger::LedgerEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait Store: Send + Sync {
    // Catalog
    async fn insert_game(&self, game: GameDefinition) -> LottoResult<()>;
    async fn get_game(&self, id: GameId) -> LottoResult<Option<GameDefinition>>;
    async fn insert_bet_type(&self, bet_type: BetTypeDefinition) -> LottoResult<()>;
    async fn get_bet_type(&self, id: BetTypeId) -> LottoResult<Option<BetTypeDefinition>>;
    /// Refused with `BetTypeInUse` while any bet references the type.
    async fn delete_bet_type(&self, id: BetTypeId) -> LottoResult<()>;
    /// Refused with `AlreadyExists` when the odds key is taken.
    async fn insert_odds(&self, entry: OddsEntry) -> LottoResult<()>;
    async fn odds_for_game(&self, game_id: GameId) -> LottoResult<Vec<OddsEntry>>;

    // Accounts
    async fn open_account(&self, user_id: UserId, opening_balance: Decimal) -> LottoResult<()>;
    async fn get_balance(&self, user_id: UserId) -> LottoResult<Decimal>;
    /// Returns the new balance.
    async fn credit(&self, user_id: UserId, amount: Decimal) -> LottoResult<Decimal>;
    /// Returns the new balance; refused with `InsufficientFunds`.
    async fn debit(&self, user_id: UserId, amount: Decimal) -> LottoResult<Decimal>;

    // Draws
    async fn insert_draw(&self, draw: Draw) -> LottoResult<()>;
    async fn get_draw(&self, id: DrawId) -> LottoResult<Option<Draw>>;
    async fn list_draws(&self) -> LottoResult<Vec<Draw>>;
    /// Move `id` from `expected` to `next`; fails if the stored status differs.
    async fn transition_draw(&self, id: DrawId, expected: DrawStatus, next: DrawStatus) -> LottoResult<Draw>;
    /// Attach winning numbers and mark the draw completed in one write.
    async fn complete_draw(
        &self,
        id: DrawId,
        expected: DrawStatus,
        winning_numbers: Vec<LottoNumber>,
    ) -> LottoResult<Draw>;
    async fn set_draw_payout_total(&self, id: DrawId, total: Decimal) -> LottoResult<Draw>;
    async fn completed_draws_with_active_bets(&self) -> LottoResult<Vec<DrawId>>;

    // Bets and ledger
    async fn get_bet(&self, id: BetId) -> LottoResult<Option<Bet>>;
    async fn active_bets_for_draw(&self, draw_id: DrawId) -> LottoResult<Vec<Bet>>;
    async fn bets_for_draw(&self, draw_id: DrawId) -> LottoResult<Vec<Bet>>;
    async fn bets_for_user(&self, user_id: UserId) -> LottoResult<Vec<Bet>>;
    async fn ledger_for_bet(&self, bet_id: BetId) -> LottoResult<Vec<LedgerEntry>>;
    async fn ledger_for_user(&self, user_id: UserId) -> LottoResult<Vec<LedgerEntry>>;

    // Atomic units
    async fn commit_placement(&self, unit: PlacementUnit) -> LottoResult<Placed>;
    async fn commit_settlement(&self, unit: SettlementUnit) -> LottoResult<CommitOutcome>;
    async fn commit_refund(&self, unit: RefundUnit) -> LottoResult<CommitOutcome>;
    async fn commit_payout_mark(&self, bet_id: BetId, paid_at: DateTime<Utc>) -> LottoResult<CommitOutcome>;
}
