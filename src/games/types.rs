use crate::common::types::{BetId, BetTypeId, DrawId, GameId, LottoNumber, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A lottery variant (e.g. a 5/90 game) and its placement limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameDefinition {
    pub id: GameId,
    pub code: String,
    pub name: String,
    pub number_range_start: LottoNumber,
    pub number_range_end: LottoNumber,
    pub min_numbers: u32,
    pub max_numbers: u32,
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    /// Free-form cadence, e.g. "daily 19:00" or "mon,wed,fri 12:30"
    pub draw_cadence: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl GameDefinition {
    pub fn contains_number(&self, number: LottoNumber) -> bool {
        (self.number_range_start..=self.number_range_end).contains(&number)
    }
}

/// A named wagering mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BetTypeDefinition {
    pub id: BetTypeId,
    /// Canonical key such as `direct_one`, `perm_two`, `banker`, `against`
    pub key: String,
    pub display_name: String,
    pub min_numbers_required: u32,
    pub max_numbers_allowed: u32,
    /// Fallback multiplier when no exact odds entry exists
    #[serde(default)]
    pub base_odds: Option<Decimal>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Payout multiplier for one (game, bet type, picked, matched) tuple
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OddsEntry {
    pub game_id: GameId,
    pub bet_type_id: BetTypeId,
    pub numbers_picked: u32,
    pub numbers_matched: u32,
    pub payout_multiplier: Decimal,
}

impl OddsEntry {
    pub fn key(&self) -> OddsKey {
        OddsKey {
            game_id: self.game_id,
            bet_type_id: self.bet_type_id,
            numbers_picked: self.numbers_picked,
            numbers_matched: self.numbers_matched,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OddsKey {
    pub game_id: GameId,
    pub bet_type_id: BetTypeId,
    pub numbers_picked: u32,
    pub numbers_matched: u32,
}

/// Draw lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DrawStatus {
    Scheduled,
    Open,
    Closed,
    Drawing,
    Completed,
    Cancelled,
}

impl DrawStatus {
    /// Forward-only: scheduled, open, closed, drawing, completed. Any
    /// state short of cancelled may be cancelled.
    pub fn can_transition_to(self, next: DrawStatus) -> bool {
        use DrawStatus::*;
        matches!(
            (self, next),
            (Scheduled, Open)
                | (Open, Closed)
                | (Closed, Drawing)
                | (Drawing, Completed)
                | (Scheduled | Open | Closed | Drawing | Completed, Cancelled)
        )
    }
}

impl fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrawStatus::Scheduled => "scheduled",
            DrawStatus::Open => "open",
            DrawStatus::Closed => "closed",
            DrawStatus::Drawing => "drawing",
            DrawStatus::Completed => "completed",
            DrawStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// One scheduled instance of a game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Draw {
    pub id: DrawId,
    pub draw_number: String,
    pub game_id: GameId,
    pub status: DrawStatus,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    /// Ordered as drawn; `None` until results are published
    pub winning_numbers: Option<Vec<LottoNumber>>,
    pub total_bets: u64,
    pub total_stake_amount: Decimal,
    pub total_payout_amount: Decimal,
}

impl Draw {
    /// Fresh draw in `scheduled` state with zeroed counters.
    pub fn scheduled(
        id: DrawId,
        draw_number: impl Into<String>,
        game_id: GameId,
        opens_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            draw_number: draw_number.into(),
            game_id,
            status: DrawStatus::Scheduled,
            opens_at,
            closes_at,
            winning_numbers: None,
            total_bets: 0,
            total_stake_amount: Decimal::ZERO,
            total_payout_amount: Decimal::ZERO,
        }
    }

    pub fn accepts_bets_at(&self, now: DateTime<Utc>) -> bool {
        self.status == DrawStatus::Open && self.opens_at <= now && now <= self.closes_at
    }

    /// Winning numbers, only when the draw is completed and they are attached.
    pub fn settleable_numbers(&self) -> Option<&[LottoNumber]> {
        match (self.status, &self.winning_numbers) {
            (DrawStatus::Completed, Some(numbers)) => Some(numbers.as_slice()),
            _ => None,
        }
    }
}

/// Bet lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Active,
    Won,
    Lost,
    Cancelled,
    Paid,
}

impl BetStatus {
    /// Once a bet leaves `active` it is never settled again.
    pub fn is_settled(self) -> bool {
        matches!(self, BetStatus::Won | BetStatus::Lost | BetStatus::Paid)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BetStatus::Pending => "pending",
            BetStatus::Active => "active",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Cancelled => "cancelled",
            BetStatus::Paid => "paid",
        };
        write!(f, "{}", name)
    }
}

/// A user's wager on a draw
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub id: BetId,
    pub bet_number: String,
    pub user_id: UserId,
    pub draw_id: DrawId,
    pub bet_type_id: BetTypeId,
    pub selected_numbers: Vec<LottoNumber>,
    pub stake_amount: Decimal,
    pub potential_winnings: Decimal,
    pub actual_winnings: Decimal,
    pub status: BetStatus,
    pub placed_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Outcome of a settled bet as seen by downstream consumers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Won,
    Lost,
}

impl From<BetOutcome> for BetStatus {
    fn from(outcome: BetOutcome) -> Self {
        match outcome {
            BetOutcome::Won => BetStatus::Won,
            BetOutcome::Lost => BetStatus::Lost,
        }
    }
}

fn default_true() -> bool {
    true
}
