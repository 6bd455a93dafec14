//! Lottery domain: definitions, odds, matching and the services that move
//! bets from placement to settlement.

pub mod draws;
pub mod events;
pub mod matching;
pub mod odds;
pub mod placement;
pub mod settlement;
pub mod statistics;
pub mod types;
pub mod valuation;

pub use draws::{CancellationReport, DrawLifecycle};
pub use events::{ChannelSink, EventSink, NoopSink, SettlementEvent};
pub use matching::{evaluate, evaluate_for_bet_type, BetKind, MalformedBet, MatchResult, MatchRules};
pub use odds::OddsTable;
pub use placement::{BetPlacement, PlaceBetRequest};
pub use settlement::{BetFailure, DrawSettlement, SettlementEngine, SettlementSummary, SkipReason};
pub use statistics::{user_statistics, UserStatistics};
pub use types::*;
pub use valuation::potential_winnings;
