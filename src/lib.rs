//! Lottoline - numbers-lottery settlement engine
//!
//! Bets are placed against scheduled draws, valued against an odds table
//! and, once winning numbers are published, settled exactly once with a
//! balanced ledger entry per balance movement.

pub mod catalog;
pub mod common;
pub mod config;
pub mod errors;
pub mod games;
pub mod ledger;
pub mod storage;

pub use catalog::{Catalog, SeedReport};
pub use common::clock::{Clock, ManualClock, SystemClock};
pub use common::reference::{ReferenceGenerator, ReferenceKind};
pub use config::LottoConfig;
pub use errors::{LottoError, LottoResult};
pub use ledger::{LedgerEntry, TransactionType};
pub use storage::{MemoryStore, RocksStore, Store};
