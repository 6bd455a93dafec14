//! RocksDB-backed store
//!
//! Records are serde_json values under prefix keys; ids are big-endian so
//! prefix scans come back in id order. Secondary indexes live under `idx:`
//! with empty values. Mutations that read before writing hold the commit
//! mutex and land as a single `WriteBatch`.
//!
//! Key layout:
//! - `game:{id}`, `bettype:{id}`, `draw:{id}`, `bet:{id}`, `ledger:{id}`
//! - `odds:{game}{bet_type}{picked}{matched}`
//! - `account:{user}`
//! - `seq:bet`, `seq:ledger`
//! - `idx:bet:draw:{draw}{bet}`, `idx:bet:user:{user}{bet}`,
//!   `idx:bet:type:{type}{bet}`, `idx:bet:active:{draw}{bet}`
//! - `idx:betnum:{bet_number}`, `idx:ledger:ref:{reference}`
//! - `idx:ledger:bet:{bet}{entry}`, `idx:ledger:user:{user}{entry}`

use super::units::{self, BetWrite, CommitOutcome, Placed, PlacementUnit, Planned, RefundUnit, SettlementUnit};
use super::Store;
use crate::common::types::{BetId, BetTypeId, DrawId, GameId, LottoNumber, UserId};
use crate::config::StorageConfig;
use crate::errors::{DrawError, LedgerError, LottoError, LottoResult, PlacementError, StorageError};
use crate::games::types::{Bet, BetStatus, BetTypeDefinition, Draw, DrawStatus, GameDefinition, OddsEntry};
use crate::ledger::LedgerEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

const GAME_PREFIX: &[u8] = b"game:";
const BET_TYPE_PREFIX: &[u8] = b"bettype:";
const ODDS_PREFIX: &[u8] = b"odds:";
const DRAW_PREFIX: &[u8] = b"draw:";
const BET_PREFIX: &[u8] = b"bet:";
const LEDGER_PREFIX: &[u8] = b"ledger:";
const ACCOUNT_PREFIX: &[u8] = b"account:";

const SEQ_BET: &[u8] = b"seq:bet";
const SEQ_LEDGER: &[u8] = b"seq:ledger";

const BETS_BY_DRAW: &[u8] = b"idx:bet:draw:";
const BETS_BY_USER: &[u8] = b"idx:bet:user:";
const BETS_BY_TYPE: &[u8] = b"idx:bet:type:";
const ACTIVE_BETS: &[u8] = b"idx:bet:active:";
const BET_NUMBERS: &[u8] = b"idx:betnum:";
const LEDGER_REFERENCES: &[u8] = b"idx:ledger:ref:";
const LEDGER_BY_BET: &[u8] = b"idx:ledger:bet:";
const LEDGER_BY_USER: &[u8] = b"idx:ledger:user:";

fn id_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

// Layout: prefix | parent(be) | child(be)
fn index_key(prefix: &[u8], parent: u64, child: u64) -> Vec<u8> {
    let mut key = id_key(prefix, parent);
    key.extend_from_slice(&child.to_be_bytes());
    key
}

fn text_key(prefix: &[u8], text: &str) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(text.as_bytes());
    key
}

fn odds_key(entry: &OddsEntry) -> Vec<u8> {
    let mut key = id_key(ODDS_PREFIX, entry.game_id);
    key.extend_from_slice(&entry.bet_type_id.to_be_bytes());
    key.extend_from_slice(&entry.numbers_picked.to_be_bytes());
    key.extend_from_slice(&entry.numbers_matched.to_be_bytes());
    key
}

/// Trailing big-endian u64 of an index key
fn trailing_id(key: &[u8]) -> Option<u64> {
    let start = key.len().checked_sub(8)?;
    let bytes: [u8; 8] = key[start..].try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

fn encode<T: Serialize>(value: &T, what: &str) -> LottoResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        LottoError::Storage(StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)))
    })
}

fn not_found(entity: &'static str, id: u64) -> LottoError {
    StorageError::NotFound { entity, id }.into()
}

/// Durable [`Store`] on RocksDB
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksStore {
    pub fn open(config: &StorageConfig) -> LottoResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, &config.data_directory)
            .map_err(|e| LottoError::Storage(StorageError::DatabaseOpenFailed(e.to_string())))?;

        tracing::info!(path = %config.data_directory.display(), "opened settlement store");
        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn get_raw(&self, key: &[u8]) -> LottoResult<Option<Vec<u8>>> {
        self.db
            .get(key)
            .map_err(|e| LottoError::Storage(StorageError::ReadFailed(e.to_string())))
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> LottoResult<Option<T>> {
        let Some(bytes) = self.get_raw(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| {
            LottoError::Storage(StorageError::CorruptedData(format!(
                "Failed to decode {}: {}",
                String::from_utf8_lossy(key),
                e
            )))
        })?;
        Ok(Some(value))
    }

    fn exists(&self, key: &[u8]) -> LottoResult<bool> {
        Ok(self.get_raw(key)?.is_some())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> LottoResult<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let mut rows = Vec::new();
        for item in self.db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| LottoError::Storage(StorageError::ReadFailed(e.to_string())))?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }

    fn scan_json<T: DeserializeOwned>(&self, prefix: &[u8]) -> LottoResult<Vec<T>> {
        self.scan_prefix(prefix)?
            .into_iter()
            .map(|(key, value)| {
                serde_json::from_slice(&value).map_err(|e| {
                    LottoError::Storage(StorageError::CorruptedData(format!(
                        "Failed to decode {}: {}",
                        String::from_utf8_lossy(&key),
                        e
                    )))
                })
            })
            .collect()
    }

    /// Ids stored as the trailing component of index keys under `prefix`.
    fn scan_index(&self, prefix: &[u8]) -> LottoResult<Vec<u64>> {
        Ok(self
            .scan_prefix(prefix)?
            .iter()
            .filter_map(|(key, _)| trailing_id(key))
            .collect())
    }

    fn bets_from_index(&self, prefix: &[u8]) -> LottoResult<Vec<Bet>> {
        let mut bets = Vec::new();
        for bet_id in self.scan_index(prefix)? {
            bets.push(self.require_bet(bet_id)?);
        }
        Ok(bets)
    }

    fn ledger_from_index(&self, prefix: &[u8]) -> LottoResult<Vec<LedgerEntry>> {
        let mut entries = Vec::new();
        for entry_id in self.scan_index(prefix)? {
            let entry = self
                .get_json(&id_key(LEDGER_PREFIX, entry_id))?
                .ok_or_else(|| not_found("ledger entry", entry_id))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn require_bet(&self, bet_id: BetId) -> LottoResult<Bet> {
        self.get_json(&id_key(BET_PREFIX, bet_id))?
            .ok_or_else(|| not_found("bet", bet_id))
    }

    fn require_draw(&self, draw_id: DrawId) -> LottoResult<Draw> {
        self.get_json(&id_key(DRAW_PREFIX, draw_id))?
            .ok_or_else(|| not_found("draw", draw_id))
    }

    fn require_balance(&self, user_id: UserId) -> LottoResult<Decimal> {
        self.get_json(&id_key(ACCOUNT_PREFIX, user_id))?
            .ok_or_else(|| not_found("account", user_id))
    }

    /// Next value of a sequence; the caller stages the bump in its batch.
    fn next_sequence(&self, key: &[u8]) -> LottoResult<u64> {
        let current = match self.get_raw(key)? {
            Some(bytes) => trailing_id(&bytes).ok_or_else(|| {
                LottoError::Storage(StorageError::CorruptedData(format!(
                    "sequence {} is malformed",
                    String::from_utf8_lossy(key)
                )))
            })?,
            None => 0,
        };
        Ok(current + 1)
    }

    fn check_reference(&self, reference: &str) -> LottoResult<()> {
        if self.exists(&text_key(LEDGER_REFERENCES, reference))? {
            return Err(LedgerError::ReferenceCollision(reference.to_string()).into());
        }
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> LottoResult<()> {
        self.db
            .write(batch)
            .map_err(|e| LottoError::Storage(StorageError::WriteFailed(e.to_string())))
    }

    fn put_new<T: Serialize>(&self, key: Vec<u8>, value: &T, entity: &'static str, id: String) -> LottoResult<()> {
        if self.exists(&key)? {
            return Err(StorageError::AlreadyExists { entity, id }.into());
        }
        let mut batch = WriteBatch::default();
        batch.put(key, encode(value, entity)?);
        self.write(batch)
    }

    fn stage_entry(batch: &mut WriteBatch, entry: &LedgerEntry) -> LottoResult<()> {
        batch.put(id_key(LEDGER_PREFIX, entry.id), encode(entry, "ledger entry")?);
        batch.put(text_key(LEDGER_REFERENCES, &entry.reference), entry.id.to_be_bytes());
        batch.put(index_key(LEDGER_BY_BET, entry.bet_id, entry.id), b"");
        batch.put(index_key(LEDGER_BY_USER, entry.user_id, entry.id), b"");
        batch.put(SEQ_LEDGER, entry.id.to_be_bytes());
        Ok(())
    }

    fn stage_bet_write(batch: &mut WriteBatch, write: &BetWrite) -> LottoResult<()> {
        let bet = &write.bet;
        batch.put(id_key(BET_PREFIX, bet.id), encode(bet, "bet")?);
        if bet.status != BetStatus::Active {
            batch.delete(index_key(ACTIVE_BETS, bet.draw_id, bet.id));
        }
        if let Some(balance) = write.balance {
            batch.put(id_key(ACCOUNT_PREFIX, bet.user_id), encode(&balance, "account")?);
        }
        if let Some(entry) = &write.entry {
            Self::stage_entry(batch, entry)?;
        }
        Ok(())
    }

    fn apply(&self, planned: Planned) -> LottoResult<CommitOutcome> {
        if let Planned::Write(write) = &planned {
            let mut batch = WriteBatch::default();
            Self::stage_bet_write(&mut batch, write)?;
            self.write(batch)?;
        }
        Ok(planned.into_outcome())
    }

    async fn update_draw<F>(&self, id: DrawId, change: F) -> LottoResult<Draw>
    where
        F: FnOnce(&mut Draw) -> LottoResult<()> + Send,
    {
        let _guard = self.commit_lock.lock().await;
        let mut draw = self.require_draw(id)?;
        change(&mut draw)?;
        let mut batch = WriteBatch::default();
        batch.put(id_key(DRAW_PREFIX, id), encode(&draw, "draw")?);
        self.write(batch)?;
        Ok(draw)
    }

    async fn update_balance(&self, user_id: UserId, delta: Decimal) -> LottoResult<Decimal> {
        let _guard = self.commit_lock.lock().await;
        let balance = self.require_balance(user_id)?;
        if balance + delta < Decimal::ZERO {
            return Err(PlacementError::InsufficientFunds {
                user: user_id,
                balance,
                required: -delta,
            }
            .into());
        }
        let mut batch = WriteBatch::default();
        batch.put(id_key(ACCOUNT_PREFIX, user_id), encode(&(balance + delta), "account")?);
        self.write(batch)?;
        Ok(balance + delta)
    }
}

#[async_trait]
impl Store for RocksStore {
    async fn insert_game(&self, game: GameDefinition) -> LottoResult<()> {
        let _guard = self.commit_lock.lock().await;
        self.put_new(id_key(GAME_PREFIX, game.id), &game, "game", game.id.to_string())
    }

    async fn get_game(&self, id: GameId) -> LottoResult<Option<GameDefinition>> {
        self.get_json(&id_key(GAME_PREFIX, id))
    }

    async fn insert_bet_type(&self, bet_type: BetTypeDefinition) -> LottoResult<()> {
        let _guard = self.commit_lock.lock().await;
        self.put_new(id_key(BET_TYPE_PREFIX, bet_type.id), &bet_type, "bet type", bet_type.id.to_string())
    }

    async fn get_bet_type(&self, id: BetTypeId) -> LottoResult<Option<BetTypeDefinition>> {
        self.get_json(&id_key(BET_TYPE_PREFIX, id))
    }

    async fn delete_bet_type(&self, id: BetTypeId) -> LottoResult<()> {
        let _guard = self.commit_lock.lock().await;
        let bets = self.scan_index(&id_key(BETS_BY_TYPE, id))?.len();
        if bets > 0 {
            return Err(StorageError::BetTypeInUse { bet_type: id, bets }.into());
        }
        let key = id_key(BET_TYPE_PREFIX, id);
        if !self.exists(&key)? {
            return Err(not_found("bet type", id));
        }
        let mut batch = WriteBatch::default();
        batch.delete(key);
        self.write(batch)
    }

    async fn insert_odds(&self, entry: OddsEntry) -> LottoResult<()> {
        let _guard = self.commit_lock.lock().await;
        let id = format!(
            "{}/{}/{}/{}",
            entry.game_id, entry.bet_type_id, entry.numbers_picked, entry.numbers_matched
        );
        self.put_new(odds_key(&entry), &entry, "odds", id)
    }

    async fn odds_for_game(&self, game_id: GameId) -> LottoResult<Vec<OddsEntry>> {
        self.scan_json(&id_key(ODDS_PREFIX, game_id))
    }

    async fn open_account(&self, user_id: UserId, opening_balance: Decimal) -> LottoResult<()> {
        let _guard = self.commit_lock.lock().await;
        self.put_new(
            id_key(ACCOUNT_PREFIX, user_id),
            &opening_balance,
            "account",
            user_id.to_string(),
        )
    }

    async fn get_balance(&self, user_id: UserId) -> LottoResult<Decimal> {
        self.require_balance(user_id)
    }

    async fn credit(&self, user_id: UserId, amount: Decimal) -> LottoResult<Decimal> {
        self.update_balance(user_id, amount).await
    }

    async fn debit(&self, user_id: UserId, amount: Decimal) -> LottoResult<Decimal> {
        self.update_balance(user_id, -amount).await
    }

    async fn insert_draw(&self, draw: Draw) -> LottoResult<()> {
        let _guard = self.commit_lock.lock().await;
        self.put_new(id_key(DRAW_PREFIX, draw.id), &draw, "draw", draw.id.to_string())
    }

    async fn get_draw(&self, id: DrawId) -> LottoResult<Option<Draw>> {
        self.get_json(&id_key(DRAW_PREFIX, id))
    }

    async fn list_draws(&self) -> LottoResult<Vec<Draw>> {
        self.scan_json(DRAW_PREFIX)
    }

    async fn transition_draw(&self, id: DrawId, expected: DrawStatus, next: DrawStatus) -> LottoResult<Draw> {
        self.update_draw(id, |draw| {
            if draw.status != expected {
                return Err(DrawError::IllegalTransition {
                    draw: id,
                    from: draw.status.to_string(),
                    to: next.to_string(),
                }
                .into());
            }
            draw.status = next;
            Ok(())
        })
        .await
    }

    async fn complete_draw(
        &self,
        id: DrawId,
        expected: DrawStatus,
        winning_numbers: Vec<LottoNumber>,
    ) -> LottoResult<Draw> {
        self.update_draw(id, move |draw| {
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
            Ok(())
        })
        .await
    }

    async fn set_draw_payout_total(&self, id: DrawId, total: Decimal) -> LottoResult<Draw> {
        self.update_draw(id, move |draw| {
            draw.total_payout_amount = total;
            Ok(())
        })
        .await
    }

    async fn completed_draws_with_active_bets(&self) -> LottoResult<Vec<DrawId>> {
        let draw_ids: BTreeSet<DrawId> = self
            .scan_prefix(ACTIVE_BETS)?
            .iter()
            .filter_map(|(key, _)| {
                let end = key.len().checked_sub(8)?;
                trailing_id(&key[..end])
            })
            .collect();

        let mut completed = Vec::new();
        for draw_id in draw_ids {
            if let Some(draw) = self.get_draw(draw_id).await? {
                if draw.status == DrawStatus::Completed {
                    completed.push(draw_id);
                }
            }
        }
        Ok(completed)
    }

    async fn get_bet(&self, id: BetId) -> LottoResult<Option<Bet>> {
        self.get_json(&id_key(BET_PREFIX, id))
    }

    async fn active_bets_for_draw(&self, draw_id: DrawId) -> LottoResult<Vec<Bet>> {
        let bets = self.bets_from_index(&id_key(ACTIVE_BETS, draw_id))?;
        Ok(bets.into_iter().filter(|bet| bet.status == BetStatus::Active).collect())
    }

    async fn bets_for_draw(&self, draw_id: DrawId) -> LottoResult<Vec<Bet>> {
        self.bets_from_index(&id_key(BETS_BY_DRAW, draw_id))
    }

    async fn bets_for_user(&self, user_id: UserId) -> LottoResult<Vec<Bet>> {
        self.bets_from_index(&id_key(BETS_BY_USER, user_id))
    }

    async fn ledger_for_bet(&self, bet_id: BetId) -> LottoResult<Vec<LedgerEntry>> {
        self.ledger_from_index(&id_key(LEDGER_BY_BET, bet_id))
    }

    async fn ledger_for_user(&self, user_id: UserId) -> LottoResult<Vec<LedgerEntry>> {
        self.ledger_from_index(&id_key(LEDGER_BY_USER, user_id))
    }

    async fn commit_placement(&self, unit: PlacementUnit) -> LottoResult<Placed> {
        let _guard = self.commit_lock.lock().await;

        if self.exists(&text_key(BET_NUMBERS, &unit.bet.bet_number))? {
            return Err(LedgerError::ReferenceCollision(unit.bet.bet_number.clone()).into());
        }
        self.check_reference(&unit.stake_reference)?;

        let draw = self.require_draw(unit.bet.draw_id)?;
        let balance = self.require_balance(unit.bet.user_id)?;
        let bet_id = self.next_sequence(SEQ_BET)?;
        let entry_id = self.next_sequence(SEQ_LEDGER)?;
        let placed = units::plan_placement(unit, &draw, balance, bet_id, entry_id)?;
        let bet = &placed.bet;

        let mut batch = WriteBatch::default();
        batch.put(id_key(BET_PREFIX, bet.id), encode(bet, "bet")?);
        batch.put(SEQ_BET, bet.id.to_be_bytes());
        batch.put(text_key(BET_NUMBERS, &bet.bet_number), bet.id.to_be_bytes());
        batch.put(index_key(BETS_BY_DRAW, bet.draw_id, bet.id), b"");
        batch.put(index_key(BETS_BY_USER, bet.user_id, bet.id), b"");
        batch.put(index_key(BETS_BY_TYPE, bet.bet_type_id, bet.id), b"");
        batch.put(index_key(ACTIVE_BETS, bet.draw_id, bet.id), b"");
        batch.put(
            id_key(ACCOUNT_PREFIX, bet.user_id),
            encode(&placed.ledger_entry.balance_after, "account")?,
        );
        batch.put(id_key(DRAW_PREFIX, placed.draw.id), encode(&placed.draw, "draw")?);
        Self::stage_entry(&mut batch, &placed.ledger_entry)?;
        self.write(batch)?;

        Ok(placed)
    }

    async fn commit_settlement(&self, unit: SettlementUnit) -> LottoResult<CommitOutcome> {
        let _guard = self.commit_lock.lock().await;
        let bet = self.require_bet(unit.bet_id)?;
        let balance = self.require_balance(bet.user_id)?;
        let entry_id = self.next_sequence(SEQ_LEDGER)?;
        let planned = units::plan_settlement(&unit, &bet, balance, entry_id)?;

        if let Planned::Write(BetWrite { entry: Some(entry), .. }) = &planned {
            self.check_reference(&entry.reference)?;
        }
        self.apply(planned)
    }

    async fn commit_refund(&self, unit: RefundUnit) -> LottoResult<CommitOutcome> {
        let _guard = self.commit_lock.lock().await;
        let bet = self.require_bet(unit.bet_id)?;
        let balance = self.require_balance(bet.user_id)?;
        let entry_id = self.next_sequence(SEQ_LEDGER)?;
        let planned = units::plan_refund(&unit, &bet, balance, entry_id)?;

        if let Planned::Write(_) = &planned {
            self.check_reference(&unit.reference)?;
        }
        self.apply(planned)
    }

    async fn commit_payout_mark(&self, bet_id: BetId, paid_at: DateTime<Utc>) -> LottoResult<CommitOutcome> {
        let _guard = self.commit_lock.lock().await;
        let bet = self.require_bet(bet_id)?;
        self.apply(units::plan_payout_mark(&bet, paid_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_keys_sort_by_parent_then_child() {
        let a = index_key(BETS_BY_DRAW, 1, 9);
        let b = index_key(BETS_BY_DRAW, 2, 1);
        assert!(a < b);
        assert_eq!(trailing_id(&a), Some(9));
    }

    #[test]
    fn test_trailing_id_rejects_short_keys() {
        assert_eq!(trailing_id(b"abc"), None);
    }
}
