//! Inputs and outputs of the atomic storage units, plus the state
//! transitions both backends share.

use crate::common::types::{BetId, BetTypeId, DrawId, LedgerEntryId, LottoNumber, UserId};
use crate::errors::{LottoResult, PlacementError};
use crate::games::types::{Bet, BetOutcome, BetStatus, Draw, DrawStatus};
use crate::ledger::{LedgerEntry, NewLedgerEntry, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Bet fields fixed at placement; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBet {
    pub bet_number: String,
    pub user_id: UserId,
    pub draw_id: DrawId,
    pub bet_type_id: BetTypeId,
    pub selected_numbers: Vec<LottoNumber>,
    pub stake_amount: Decimal,
    pub potential_winnings: Decimal,
    pub placed_at: DateTime<Utc>,
}

/// Debit the stake, create the active bet, record the stake entry and
/// bump the draw counters.
#[derive(Debug, Clone)]
pub struct PlacementUnit {
    pub bet: NewBet,
    pub stake_reference: String,
}

#[derive(Debug, Clone)]
pub struct Placed {
    pub bet: Bet,
    pub ledger_entry: LedgerEntry,
    pub draw: Draw,
}

/// Move an active bet to won or lost, crediting winnings when won.
#[derive(Debug, Clone)]
pub struct SettlementUnit {
    pub bet_id: BetId,
    pub outcome: BetOutcome,
    pub actual_winnings: Decimal,
    /// Used only when a credit is recorded
    pub win_reference: String,
    pub processed_at: DateTime<Utc>,
}

/// Cancel an active bet and return its stake.
#[derive(Debug, Clone)]
pub struct RefundUnit {
    pub bet_id: BetId,
    pub reference: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Applied {
        bet: Bet,
        ledger_entry: Option<LedgerEntry>,
    },
    /// The bet was no longer in the expected status; nothing was written.
    Conflict { current: BetStatus },
}

impl CommitOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CommitOutcome::Applied { .. })
    }
}

pub(crate) enum Planned {
    Write(BetWrite),
    Conflict(BetStatus),
}

impl Planned {
    pub(crate) fn into_outcome(self) -> CommitOutcome {
        match self {
            Planned::Write(write) => CommitOutcome::Applied {
                bet: write.bet,
                ledger_entry: write.entry,
            },
            Planned::Conflict(current) => CommitOutcome::Conflict { current },
        }
    }
}

/// Rows a unit replaces
pub(crate) struct BetWrite {
    pub bet: Bet,
    /// New account balance, when it changed
    pub balance: Option<Decimal>,
    pub entry: Option<LedgerEntry>,
}

pub(crate) fn plan_placement(
    unit: PlacementUnit,
    draw: &Draw,
    balance: Decimal,
    bet_id: BetId,
    entry_id: LedgerEntryId,
) -> LottoResult<Placed> {
    let new_bet = unit.bet;
    if draw.status != DrawStatus::Open {
        return Err(PlacementError::DrawNotOpen(draw.id).into());
    }
    if balance < new_bet.stake_amount {
        return Err(PlacementError::InsufficientFunds {
            user: new_bet.user_id,
            balance,
            required: new_bet.stake_amount,
        }
        .into());
    }

    let entry = NewLedgerEntry {
        reference: unit.stake_reference,
        bet_id,
        user_id: new_bet.user_id,
        entry_type: TransactionType::Stake,
        amount: new_bet.stake_amount,
        description: format!("Stake for bet {} on draw {}", new_bet.bet_number, draw.draw_number),
    }
    .post(entry_id, balance, new_bet.placed_at)?;

    let mut draw = draw.clone();
    draw.total_bets += 1;
    draw.total_stake_amount += new_bet.stake_amount;

    let bet = Bet {
        id: bet_id,
        bet_number: new_bet.bet_number,
        user_id: new_bet.user_id,
        draw_id: new_bet.draw_id,
        bet_type_id: new_bet.bet_type_id,
        selected_numbers: new_bet.selected_numbers,
        stake_amount: new_bet.stake_amount,
        potential_winnings: new_bet.potential_winnings,
        actual_winnings: Decimal::ZERO,
        status: BetStatus::Active,
        placed_at: new_bet.placed_at,
        processed_at: None,
        paid_at: None,
    };

    Ok(Placed {
        bet,
        ledger_entry: entry,
        draw,
    })
}

pub(crate) fn plan_settlement(
    unit: &SettlementUnit,
    bet: &Bet,
    balance: Decimal,
    entry_id: LedgerEntryId,
) -> LottoResult<Planned> {
    if bet.status != BetStatus::Active {
        return Ok(Planned::Conflict(bet.status));
    }

    let mut updated = bet.clone();
    updated.status = unit.outcome.into();
    updated.processed_at = Some(unit.processed_at);

    let credit = match unit.outcome {
        BetOutcome::Won if unit.actual_winnings > Decimal::ZERO => Some(unit.actual_winnings),
        _ => None,
    };
    updated.actual_winnings = credit.unwrap_or(Decimal::ZERO);

    let entry = match credit {
        Some(amount) => Some(
            NewLedgerEntry {
                reference: unit.win_reference.clone(),
                bet_id: bet.id,
                user_id: bet.user_id,
                entry_type: TransactionType::Win,
                amount,
                description: format!("Winnings for bet {}", bet.bet_number),
            }
            .post(entry_id, balance, unit.processed_at)?,
        ),
        None => None,
    };

    Ok(Planned::Write(BetWrite {
        bet: updated,
        balance: entry.as_ref().map(|e| e.balance_after),
        entry,
    }))
}

pub(crate) fn plan_refund(
    unit: &RefundUnit,
    bet: &Bet,
    balance: Decimal,
    entry_id: LedgerEntryId,
) -> LottoResult<Planned> {
    if bet.status != BetStatus::Active {
        return Ok(Planned::Conflict(bet.status));
    }

    let entry = NewLedgerEntry {
        reference: unit.reference.clone(),
        bet_id: bet.id,
        user_id: bet.user_id,
        entry_type: TransactionType::Refund,
        amount: bet.stake_amount,
        description: format!("Refund for bet {}, draw cancelled", bet.bet_number),
    }
    .post(entry_id, balance, unit.processed_at)?;

    let mut updated = bet.clone();
    updated.status = BetStatus::Cancelled;
    updated.processed_at = Some(unit.processed_at);

    Ok(Planned::Write(BetWrite {
        bet: updated,
        balance: Some(entry.balance_after),
        entry: Some(entry),
    }))
}

pub(crate) fn plan_payout_mark(bet: &Bet, paid_at: DateTime<Utc>) -> Planned {
    if bet.status != BetStatus::Won {
        return Planned::Conflict(bet.status);
    }
    let mut updated = bet.clone();
    updated.status = BetStatus::Paid;
    updated.paid_at = Some(paid_at);
    Planned::Write(BetWrite {
        bet: updated,
        balance: None,
        entry: None,
    })
}
