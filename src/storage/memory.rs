//! In-process store behind a single lock

use super::units::{self, CommitOutcome, Placed, PlacementUnit, Planned, RefundUnit, SettlementUnit};
use super::Store;
use crate::common::types::{BetId, BetTypeId, DrawId, GameId, LottoNumber, UserId};
use crate::errors::{DrawError, LedgerError, LottoResult, PlacementError, StorageError};
use crate::games::types::{Bet, BetStatus, BetTypeDefinition, Draw, DrawStatus, GameDefinition, OddsEntry, OddsKey};
use crate::ledger::LedgerEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    games: BTreeMap<GameId, GameDefinition>,
    bet_types: BTreeMap<BetTypeId, BetTypeDefinition>,
    odds: HashMap<OddsKey, OddsEntry>,
    accounts: HashMap<UserId, Decimal>,
    draws: BTreeMap<DrawId, Draw>,
    bets: BTreeMap<BetId, Bet>,
    bet_numbers: HashSet<String>,
    ledger: Vec<LedgerEntry>,
    ledger_references: HashSet<String>,
}

impl Tables {
    fn balance(&self, user_id: UserId) -> LottoResult<Decimal> {
        self.accounts.get(&user_id).copied().ok_or_else(|| {
            StorageError::NotFound {
                entity: "account",
                id: user_id,
            }
            .into()
        })
    }

    fn bet(&self, bet_id: BetId) -> LottoResult<&Bet> {
        self.bets.get(&bet_id).ok_or_else(|| {
            StorageError::NotFound {
                entity: "bet",
                id: bet_id,
            }
            .into()
        })
    }

    fn draw_mut(&mut self, draw_id: DrawId) -> LottoResult<&mut Draw> {
        self.draws.get_mut(&draw_id).ok_or_else(|| {
            StorageError::NotFound {
                entity: "draw",
                id: draw_id,
            }
            .into()
        })
    }

    fn next_ledger_id(&self) -> u64 {
        self.ledger.len() as u64 + 1
    }

    fn check_reference(&self, reference: &str) -> LottoResult<()> {
        if self.ledger_references.contains(reference) {
            return Err(LedgerError::ReferenceCollision(reference.to_string()).into());
        }
        Ok(())
    }

    fn apply(&mut self, planned: Planned) -> CommitOutcome {
        if let Planned::Write(write) = &planned {
            if let Some(balance) = write.balance {
                self.accounts.insert(write.bet.user_id, balance);
            }
            if let Some(entry) = &write.entry {
                self.ledger_references.insert(entry.reference.clone());
                self.ledger.push(entry.clone());
            }
            self.bets.insert(write.bet.id, write.bet.clone());
        }
        planned.into_outcome()
    }
}

/// Volatile [`Store`] used by tests and dry runs
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_game(&self, game: GameDefinition) -> LottoResult<()> {
        let mut tables = self.tables.write().await;
        if tables.games.contains_key(&game.id) {
            return Err(StorageError::AlreadyExists {
                entity: "game",
                id: game.id.to_string(),
            }
            .into());
        }
        tables.games.insert(game.id, game);
        Ok(())
    }

    async fn get_game(&self, id: GameId) -> LottoResult<Option<GameDefinition>> {
        Ok(self.tables.read().await.games.get(&id).cloned())
    }

    async fn insert_bet_type(&self, bet_type: BetTypeDefinition) -> LottoResult<()> {
        let mut tables = self.tables.write().await;
        if tables.bet_types.contains_key(&bet_type.id) {
            return Err(StorageError::AlreadyExists {
                entity: "bet type",
                id: bet_type.id.to_string(),
            }
            .into());
        }
        tables.bet_types.insert(bet_type.id, bet_type);
        Ok(())
    }

    async fn get_bet_type(&self, id: BetTypeId) -> LottoResult<Option<BetTypeDefinition>> {
        Ok(self.tables.read().await.bet_types.get(&id).cloned())
    }

    async fn delete_bet_type(&self, id: BetTypeId) -> LottoResult<()> {
        let mut tables = self.tables.write().await;
        let bets = tables.bets.values().filter(|bet| bet.bet_type_id == id).count();
        if bets > 0 {
            return Err(StorageError::BetTypeInUse { bet_type: id, bets }.into());
        }
        tables
            .bet_types
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound { entity: "bet type", id }.into())
    }

    async fn insert_odds(&self, entry: OddsEntry) -> LottoResult<()> {
        let mut tables = self.tables.write().await;
        let key = entry.key();
        if tables.odds.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                entity: "odds",
                id: format!(
                    "{}/{}/{}/{}",
                    key.game_id, key.bet_type_id, key.numbers_picked, key.numbers_matched
                ),
            }
            .into());
        }
        tables.odds.insert(key, entry);
        Ok(())
    }

    async fn odds_for_game(&self, game_id: GameId) -> LottoResult<Vec<OddsEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .odds
            .values()
            .filter(|entry| entry.game_id == game_id)
            .cloned()
            .collect())
    }

    async fn open_account(&self, user_id: UserId, opening_balance: Decimal) -> LottoResult<()> {
        let mut tables = self.tables.write().await;
        if tables.accounts.contains_key(&user_id) {
            return Err(StorageError::AlreadyExists {
                entity: "account",
                id: user_id.to_string(),
            }
            .into());
        }
        tables.accounts.insert(user_id, opening_balance);
        Ok(())
    }

    async fn get_balance(&self, user_id: UserId) -> LottoResult<Decimal> {
        self.tables.read().await.balance(user_id)
    }

    async fn credit(&self, user_id: UserId, amount: Decimal) -> LottoResult<Decimal> {
        let mut tables = self.tables.write().await;
        let balance = tables.balance(user_id)? + amount;
        tables.accounts.insert(user_id, balance);
        Ok(balance)
    }

    async fn debit(&self, user_id: UserId, amount: Decimal) -> LottoResult<Decimal> {
        let mut tables = self.tables.write().await;
        let balance = tables.balance(user_id)?;
        if balance < amount {
            return Err(PlacementError::InsufficientFunds {
                user: user_id,
                balance,
                required: amount,
            }
            .into());
        }
        tables.accounts.insert(user_id, balance - amount);
        Ok(balance - amount)
    }

    async fn insert_draw(&self, draw: Draw) -> LottoResult<()> {
        let mut tables = self.tables.write().await;
        if tables.draws.contains_key(&draw.id) {
            return Err(StorageError::AlreadyExists {
                entity: "draw",
                id: draw.id.to_string(),
            }
            .into());
        }
        tables.draws.insert(draw.id, draw);
        Ok(())
    }

    async fn get_draw(&self, id: DrawId) -> LottoResult<Option<Draw>> {
        Ok(self.tables.read().await.draws.get(&id).cloned())
    }

    async fn list_draws(&self) -> LottoResult<Vec<Draw>> {
        Ok(self.tables.read().await.draws.values().cloned().collect())
    }

    async fn transition_draw(&self, id: DrawId, expected: DrawStatus, next: DrawStatus) -> LottoResult<Draw> {
        let mut tables = self.tables.write().await;
        let draw = tables.draw_mut(id)?;
        if draw.status != expected {
            return Err(DrawError::IllegalTransition {
                draw: id,
                from: draw.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        draw.status = next;
        Ok(draw.clone())
    }

    async fn complete_draw(
        &self,
        id: DrawId,
        expected: DrawStatus,
        winning_numbers: Vec<LottoNumber>,
    ) -> LottoResult<Draw> {
        let mut tables = self.tables.write().await;
        let draw = tables.draw_mut(id)?;
        if draw.status != expected {
            return Err(DrawError::IllegalTransition {
                draw: id,
                from: draw.status.to_string(),
                to: DrawStatus::Completed.to_string(),
            }
            .into());
        }
        draw.status = DrawStatus::Completed;
        draw.winning_numbers = Some(winning_numbers);
        Ok(draw.clone())
    }

    async fn set_draw_payout_total(&self, id: DrawId, total: Decimal) -> LottoResult<Draw> {
        let mut tables = self.tables.write().await;
        let draw = tables.draw_mut(id)?;
        draw.total_payout_amount = total;
        Ok(draw.clone())
    }

    async fn completed_draws_with_active_bets(&self) -> LottoResult<Vec<DrawId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .draws
            .values()
            .filter(|draw| draw.status == DrawStatus::Completed)
            .filter(|draw| {
                tables
                    .bets
                    .values()
                    .any(|bet| bet.draw_id == draw.id && bet.status == BetStatus::Active)
            })
            .map(|draw| draw.id)
            .collect())
    }

    async fn get_bet(&self, id: BetId) -> LottoResult<Option<Bet>> {
        Ok(self.tables.read().await.bets.get(&id).cloned())
    }

    async fn active_bets_for_draw(&self, draw_id: DrawId) -> LottoResult<Vec<Bet>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bets
            .values()
            .filter(|bet| bet.draw_id == draw_id && bet.status == BetStatus::Active)
            .cloned()
            .collect())
    }

    async fn bets_for_draw(&self, draw_id: DrawId) -> LottoResult<Vec<Bet>> {
        let tables = self.tables.read().await;
        Ok(tables.bets.values().filter(|bet| bet.draw_id == draw_id).cloned().collect())
    }

    async fn bets_for_user(&self, user_id: UserId) -> LottoResult<Vec<Bet>> {
        let tables = self.tables.read().await;
        Ok(tables.bets.values().filter(|bet| bet.user_id == user_id).cloned().collect())
    }

    async fn ledger_for_bet(&self, bet_id: BetId) -> LottoResult<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.ledger.iter().filter(|e| e.bet_id == bet_id).cloned().collect())
    }

    async fn ledger_for_user(&self, user_id: UserId) -> LottoResult<Vec<LedgerEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.ledger.iter().filter(|e| e.user_id == user_id).cloned().collect())
    }

    async fn commit_placement(&self, unit: PlacementUnit) -> LottoResult<Placed> {
        let mut tables = self.tables.write().await;

        if tables.bet_numbers.contains(&unit.bet.bet_number) {
            return Err(LedgerError::ReferenceCollision(unit.bet.bet_number.clone()).into());
        }
        tables.check_reference(&unit.stake_reference)?;

        let draw = tables
            .draws
            .get(&unit.bet.draw_id)
            .ok_or(StorageError::NotFound {
                entity: "draw",
                id: unit.bet.draw_id,
            })?;
        let balance = tables.balance(unit.bet.user_id)?;
        let bet_id = tables.bets.len() as u64 + 1;
        let placed = units::plan_placement(unit, draw, balance, bet_id, tables.next_ledger_id())?;

        tables
            .accounts
            .insert(placed.bet.user_id, placed.ledger_entry.balance_after);
        tables.bet_numbers.insert(placed.bet.bet_number.clone());
        tables.bets.insert(bet_id, placed.bet.clone());
        tables
            .ledger_references
            .insert(placed.ledger_entry.reference.clone());
        tables.ledger.push(placed.ledger_entry.clone());
        tables.draws.insert(placed.draw.id, placed.draw.clone());

        Ok(placed)
    }

    async fn commit_settlement(&self, unit: SettlementUnit) -> LottoResult<CommitOutcome> {
        let mut tables = self.tables.write().await;
        let bet = tables.bet(unit.bet_id)?;
        let balance = tables.balance(bet.user_id)?;
        let planned = units::plan_settlement(&unit, bet, balance, tables.next_ledger_id())?;

        if let Planned::Write(write) = &planned {
            if let Some(entry) = &write.entry {
                tables.check_reference(&entry.reference)?;
            }
        }
        Ok(tables.apply(planned))
    }

    async fn commit_refund(&self, unit: RefundUnit) -> LottoResult<CommitOutcome> {
        let mut tables = self.tables.write().await;
        let bet = tables.bet(unit.bet_id)?;
        let balance = tables.balance(bet.user_id)?;
        let planned = units::plan_refund(&unit, bet, balance, tables.next_ledger_id())?;

        if let Planned::Write(_) = &planned {
            tables.check_reference(&unit.reference)?;
        }
        Ok(tables.apply(planned))
    }

    async fn commit_payout_mark(&self, bet_id: BetId, paid_at: DateTime<Utc>) -> LottoResult<CommitOutcome> {
        let mut tables = self.tables.write().await;
        let planned = units::plan_payout_mark(tables.bet(bet_id)?, paid_at);
        Ok(tables.apply(planned))
    }
}
