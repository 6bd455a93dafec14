//! Append-only bet transaction ledger
//!
//! Every balance movement tied to a bet produces exactly one immutable
//! [`LedgerEntry`] carrying the balance before and after the movement.
//! Entries are created inside the storage layer's atomic units; nothing in
//! the service updates or deletes them.

use crate::common::reference::{ReferenceGenerator, ReferenceKind};
use crate::common::types::{BetId, LedgerEntryId, UserId};
use crate::errors::{LedgerError, LottoResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use tracing::warn;

/// Kind of balance movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Stake,
    Win,
    Refund,
    Commission,
}

impl TransactionType {
    /// Credits raise the balance; debits lower it.
    pub fn is_credit(self) -> bool {
        matches!(self, TransactionType::Win | TransactionType::Refund)
    }

    /// Signed balance delta for `amount`.
    pub fn signed(self, amount: Decimal) -> Decimal {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionType::Stake => "stake",
            TransactionType::Win => "win",
            TransactionType::Refund => "refund",
            TransactionType::Commission => "commission",
        };
        write!(f, "{}", name)
    }
}

/// One recorded balance movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub reference: String,
    pub bet_id: BetId,
    pub user_id: UserId,
    pub entry_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `balance_after - balance_before` equals the signed amount.
    pub fn is_balanced(&self) -> bool {
        self.balance_after - self.balance_before == self.entry_type.signed(self.amount)
    }
}

/// Entry awaiting its id and balance snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub reference: String,
    pub bet_id: BetId,
    pub user_id: UserId,
    pub entry_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
}

impl NewLedgerEntry {
    /// Fix the entry against the account balance at commit time.
    pub fn post(
        self,
        id: LedgerEntryId,
        balance_before: Decimal,
        created_at: DateTime<Utc>,
    ) -> Result<LedgerEntry, LedgerError> {
        let entry = LedgerEntry {
            id,
            balance_after: balance_before + self.entry_type.signed(self.amount),
            reference: self.reference,
            bet_id: self.bet_id,
            user_id: self.user_id,
            entry_type: self.entry_type,
            amount: self.amount,
            balance_before,
            description: self.description,
            created_at,
        };

        if entry.amount < Decimal::ZERO || !entry.is_balanced() {
            return Err(LedgerError::UnbalancedEntry {
                reference: entry.reference,
            });
        }
        Ok(entry)
    }
}

/// Run `attempt` with a fresh reference, regenerating after a collision up
/// to `retry_limit` times. Any other outcome is returned as is.
pub async fn with_fresh_reference<T, F, Fut>(
    references: &ReferenceGenerator,
    kind: ReferenceKind,
    retry_limit: u32,
    mut attempt: F,
) -> LottoResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = LottoResult<T>>,
{
    let mut retries = 0;
    loop {
        let reference = references.next(kind);
        match attempt(reference.clone()).await {
            Err(e) if e.is_reference_collision() && retries < retry_limit => {
                retries += 1;
                warn!(reference = %reference, retries, "ledger reference collision, regenerating");
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::clock::ManualClock;
    use crate::errors::LottoError;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn draft(entry_type: TransactionType, amount: Decimal) -> NewLedgerEntry {
        NewLedgerEntry {
            reference: "WIN20240501000000ABCDEF01".to_string(),
            bet_id: 1,
            user_id: 9,
            entry_type,
            amount,
            description: "test".to_string(),
        }
    }

    #[test]
    fn test_credit_entry_balances() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let entry = draft(TransactionType::Win, dec!(400.00)).post(1, dec!(90.00), now).unwrap();
        assert_eq!(entry.balance_after, dec!(490.00));
        assert_eq!(entry.balance_after - entry.balance_before, entry.amount);
        assert!(entry.is_balanced());
    }

    #[test]
    fn test_debit_entry_balances() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let entry = draft(TransactionType::Stake, dec!(10.00)).post(1, dec!(100.00), now).unwrap();
        assert_eq!(entry.balance_after, dec!(90.00));
        assert_eq!(entry.balance_after - entry.balance_before, -entry.amount);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let err = draft(TransactionType::Refund, dec!(-1)).post(1, dec!(5), now).unwrap_err();
        assert!(matches!(err, LedgerError::UnbalancedEntry { .. }));
    }

    #[test]
    fn test_transaction_type_direction() {
        assert!(TransactionType::Win.is_credit());
        assert!(TransactionType::Refund.is_credit());
        assert!(!TransactionType::Stake.is_credit());
        assert!(!TransactionType::Commission.is_credit());
    }

    fn generator() -> ReferenceGenerator {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()));
        ReferenceGenerator::new(clock, Box::new(StdRng::seed_from_u64(3)))
    }

    #[tokio::test]
    async fn test_retries_once_after_collision() {
        let references = generator();
        let mut seen = Vec::new();

        let result = with_fresh_reference(&references, ReferenceKind::Win, 1, |reference| {
            seen.push(reference.clone());
            let first = seen.len() == 1;
            async move {
                if first {
                    Err(LottoError::from(LedgerError::ReferenceCollision(reference)))
                } else {
                    Ok(reference)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert_eq!(result, seen[1]);
    }

    #[tokio::test]
    async fn test_repeated_collision_surfaces() {
        let references = generator();
        let mut attempts = 0;

        let result: LottoResult<()> = with_fresh_reference(&references, ReferenceKind::Win, 1, |reference| {
            attempts += 1;
            async move { Err(LottoError::from(LedgerError::ReferenceCollision(reference))) }
        })
        .await;

        assert_eq!(attempts, 2);
        assert!(result.unwrap_err().is_reference_collision());
    }
}
