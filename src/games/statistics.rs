//! Per-user betting statistics

use crate::common::money::round_currency;
use crate::common::types::UserId;
use crate::errors::LottoResult;
use crate::games::types::BetStatus;
use crate::storage::Store;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStatistics {
    pub user_id: UserId,
    /// Bets that stood; refunded bets are counted separately
    pub total_bets: usize,
    pub total_staked: Decimal,
    /// Won bets, paid or not
    pub bets_won: usize,
    pub total_winnings: Decimal,
    /// Percentage of all bets that won, two decimal places
    pub win_rate: Decimal,
    pub active_bets: usize,
    pub refunded_bets: usize,
    pub refunded_amount: Decimal,
    pub balance: Decimal,
}

pub async fn user_statistics(store: &dyn Store, user_id: UserId) -> LottoResult<UserStatistics> {
    let (refunded, bets): (Vec<_>, Vec<_>) = store
        .bets_for_user(user_id)
        .await?
        .into_iter()
        .partition(|bet| bet.status == BetStatus::Cancelled);
    let balance = store.get_balance(user_id).await?;

    let won: Vec<_> = bets
        .iter()
        .filter(|bet| matches!(bet.status, BetStatus::Won | BetStatus::Paid))
        .collect();
    let win_rate = if bets.is_empty() {
        Decimal::ZERO
    } else {
        round_currency(Decimal::from(won.len()) * Decimal::ONE_HUNDRED / Decimal::from(bets.len()))
    };

    Ok(UserStatistics {
        user_id,
        total_bets: bets.len(),
        total_staked: bets.iter().map(|bet| bet.stake_amount).sum(),
        bets_won: won.len(),
        total_winnings: won.iter().map(|bet| bet.actual_winnings).sum(),
        win_rate,
        active_bets: bets.iter().filter(|bet| bet.status == BetStatus::Active).count(),
        refunded_bets: refunded.len(),
        refunded_amount: refunded.iter().map(|bet| bet.stake_amount).sum(),
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{BetOutcome, Draw, DrawStatus};
    use crate::storage::{MemoryStore, NewBet, PlacementUnit, RefundUnit, SettlementUnit};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_statistics_for_mixed_bets() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let store = MemoryStore::new();
        let mut draw = Draw::scheduled(1, "NLA-0001", 1, now, now);
        draw.status = DrawStatus::Open;
        store.insert_draw(draw).await.unwrap();
        store.open_account(1, dec!(100.00)).await.unwrap();

        for i in 0..4u32 {
            store
                .commit_placement(PlacementUnit {
                    bet: NewBet {
                        bet_number: format!("BET{i}"),
                        user_id: 1,
                        draw_id: 1,
                        bet_type_id: 1,
                        selected_numbers: vec![i + 1],
                        stake_amount: dec!(10.00),
                        potential_winnings: dec!(400.00),
                        placed_at: now,
                    },
                    stake_reference: format!("STK{i}"),
                })
                .await
                .unwrap();
        }
        store
            .commit_settlement(SettlementUnit {
                bet_id: 1,
                outcome: BetOutcome::Won,
                actual_winnings: dec!(400.00),
                win_reference: "WIN1".to_string(),
                processed_at: now,
            })
            .await
            .unwrap();
        store
            .commit_settlement(SettlementUnit {
                bet_id: 2,
                outcome: BetOutcome::Lost,
                actual_winnings: Decimal::ZERO,
                win_reference: "WIN2".to_string(),
                processed_at: now,
            })
            .await
            .unwrap();

        store
            .commit_refund(RefundUnit {
                bet_id: 4,
                reference: "RFD4".to_string(),
                processed_at: now,
            })
            .await
            .unwrap();

        let stats = user_statistics(&store, 1).await.unwrap();
        assert_eq!(stats.total_bets, 3);
        assert_eq!(stats.total_staked, dec!(30.00));
        assert_eq!(stats.bets_won, 1);
        assert_eq!(stats.total_winnings, dec!(400.00));
        assert_eq!(stats.win_rate, dec!(33.33));
        assert_eq!(stats.active_bets, 1);
        assert_eq!(stats.refunded_bets, 1);
        assert_eq!(stats.refunded_amount, dec!(10.00));
        assert_eq!(stats.balance, dec!(470.00));
    }
}
