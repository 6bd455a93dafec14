//! Error types for the lottoline settlement service
//!
//! One enum per concern, folded into [`LottoError`] so service code can
//! propagate with `?` regardless of which layer failed.

use crate::common::types::{BetTypeId, DrawId, GameId, UserId};
use rust_decimal::Decimal;
use std::fmt;

/// Root error type for all lottoline operations
#[derive(Debug)]
pub enum LottoError {
    /// Odds or service configuration errors
    Configuration(ConfigurationError),

    /// Bet placement validation errors
    Placement(PlacementError),

    /// Draw lifecycle errors
    Draw(DrawError),

    /// Ledger append errors
    Ledger(LedgerError),

    /// Storage system errors
    Storage(StorageError),
}

/// Configuration and odds resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no payout multiplier for bet type {bet_type} in game {game} ({picked} picked, {matched} matched)")]
    MissingMultiplier {
        game: GameId,
        bet_type: String,
        picked: u32,
        matched: u32,
    },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Reasons a bet is refused at placement time
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlacementError {
    #[error("draw {0} is not open for betting")]
    DrawNotOpen(DrawId),

    #[error("draw {0} is outside its betting window")]
    OutsideBettingWindow(DrawId),

    #[error("game {0} is not active")]
    GameInactive(GameId),

    #[error("bet type {0} is not active")]
    BetTypeInactive(BetTypeId),

    #[error("selected {count} numbers, allowed {min}..={max}")]
    WrongNumberCount { count: usize, min: u32, max: u32 },

    #[error("number {number} is outside {start}..={end}")]
    NumberOutOfRange { number: u32, start: u32, end: u32 },

    #[error("number {0} was selected more than once")]
    DuplicateNumber(u32),

    #[error("stake {stake} is outside {min}..={max}")]
    StakeOutOfBounds {
        stake: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("user {user} has insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds {
        user: UserId,
        balance: Decimal,
        required: Decimal,
    },
}

/// Draw state machine errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DrawError {
    #[error("draw {draw} cannot move from {from} to {to}")]
    IllegalTransition {
        draw: DrawId,
        from: String,
        to: String,
    },

    #[error("invalid winning numbers for draw {draw}: {reason}")]
    InvalidWinningNumbers { draw: DrawId, reason: String },
}

/// Ledger append errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LedgerError {
    #[error("ledger reference {0} already exists")]
    ReferenceCollision(String),

    #[error("ledger entry {reference} violates balance arithmetic")]
    UnbalancedEntry { reference: String },
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("bet type {bet_type} is referenced by {bets} bets and cannot be deleted")]
    BetTypeInUse { bet_type: BetTypeId, bets: usize },

    #[error("database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl fmt::Display for LottoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LottoError::Configuration(e) => write!(f, "Configuration error: {}", e),
            LottoError::Placement(e) => write!(f, "Placement error: {}", e),
            LottoError::Draw(e) => write!(f, "Draw error: {}", e),
            LottoError::Ledger(e) => write!(f, "Ledger error: {}", e),
            LottoError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for LottoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LottoError::Configuration(e) => Some(e),
            LottoError::Placement(e) => Some(e),
            LottoError::Draw(e) => Some(e),
            LottoError::Ledger(e) => Some(e),
            LottoError::Storage(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for LottoError {
    fn from(e: ConfigurationError) -> Self {
        LottoError::Configuration(e)
    }
}

impl From<PlacementError> for LottoError {
    fn from(e: PlacementError) -> Self {
        LottoError::Placement(e)
    }
}

impl From<DrawError> for LottoError {
    fn from(e: DrawError) -> Self {
        LottoError::Draw(e)
    }
}

impl From<LedgerError> for LottoError {
    fn from(e: LedgerError) -> Self {
        LottoError::Ledger(e)
    }
}

impl From<StorageError> for LottoError {
    fn from(e: StorageError) -> Self {
        LottoError::Storage(e)
    }
}

// External error conversions
impl From<rocksdb::Error> for LottoError {
    fn from(e: rocksdb::Error) -> Self {
        LottoError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for LottoError {
    fn from(e: serde_json::Error) -> Self {
        LottoError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<toml::de::Error> for LottoError {
    fn from(e: toml::de::Error) -> Self {
        LottoError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<std::io::Error> for LottoError {
    fn from(e: std::io::Error) -> Self {
        LottoError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl LottoError {
    /// True when the error is a ledger reference collision that a caller
    /// may retry with a fresh reference.
    pub fn is_reference_collision(&self) -> bool {
        matches!(self, LottoError::Ledger(LedgerError::ReferenceCollision(_)))
    }
}

// Convenience type alias for Results
pub type LottoResult<T> = Result<T, LottoError>;
