//! Shared identifier types
//!
//! Rows in every table are keyed by a 64-bit id, mirroring the relational
//! schema (games, bet_types, odds, draws, bets, ledger_entries).

pub type GameId = u64;
pub type BetTypeId = u64;
pub type DrawId = u64;
pub type BetId = u64;
pub type UserId = u64;
pub type LedgerEntryId = u64;

/// A drawn or selected lottery number.
pub type LottoNumber = u32;
