//! RocksDB store: persistence across restarts and status guards

use chrono::{DateTime, Duration, TimeZone, Utc};
use lottoline::{
    catalog::Catalog,
    common::types::{BetTypeId, LottoNumber, UserId},
    config::{LottoConfig, StorageConfig},
    games::{
        Bet, BetPlacement, BetStatus, DrawLifecycle, DrawSettlement, DrawStatus, Draw, NoopSink, PlaceBetRequest,
        SettlementEngine,
    },
    ledger::TransactionType,
    storage::{CommitOutcome, RefundUnit, RocksStore, Store},
    ManualClock, ReferenceGenerator,
};
use rand::{rngs::StdRng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn storage_at(path: &std::path::Path) -> StorageConfig {
    StorageConfig {
        data_directory: path.to_path_buf(),
        create_if_missing: true,
    }
}

#[tokio::test]
async fn test_settled_state_survives_restart() {
    let dir = tempdir().expect("create temp db dir");
    let storage = storage_at(dir.path());
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    let bet_id = {
        let store: Arc<dyn Store> = Arc::new(RocksStore::open(&storage).unwrap());
        Catalog::standard().seed(store.as_ref()).await.unwrap();
        store
            .insert_draw(Draw::scheduled(1, "NLA-0001", 1, start, start + Duration::hours(10)))
            .await
            .unwrap();
        store.open_account(1, dec!(100.00)).await.unwrap();

        let clock = Arc::new(ManualClock::new(start + Duration::hours(1)));
        let references = Arc::new(ReferenceGenerator::new(clock.clone(), Box::new(StdRng::seed_from_u64(9))));
        let draws = DrawLifecycle::new(store.clone(), clock.clone(), references.clone(), 1);
        let placement = BetPlacement::new(store.clone(), clock.clone(), references.clone(), 1);

        draws.open(1).await.unwrap();
        let bet = placement
            .place(PlaceBetRequest {
                user_id: 1,
                draw_id: 1,
                bet_type_id: 1,
                selected_numbers: vec![42],
                stake_amount: dec!(10.00),
            })
            .await
            .unwrap();

        draws.close(1).await.unwrap();
        draws.publish_results(1, vec![42, 17, 88, 23, 5]).await.unwrap();

        let engine = SettlementEngine::new(
            store.clone(),
            Arc::new(NoopSink),
            clock.clone(),
            references.clone(),
            &LottoConfig::testing(),
        );
        let report = engine.settle_draw(1).await.unwrap();
        assert_eq!(report.summary().unwrap().winners, 1);
        bet.id
    };

    // Every handle to the first instance is dropped; the lock is free.
    let store = RocksStore::open(&storage).unwrap();
    assert_eq!(store.get_balance(1).await.unwrap(), dec!(490.00));

    let bet = store.get_bet(bet_id).await.unwrap().unwrap();
    assert_eq!(bet.status, BetStatus::Won);
    assert_eq!(bet.actual_winnings, dec!(400.00));

    let draw = store.get_draw(1).await.unwrap().unwrap();
    assert_eq!(draw.status, DrawStatus::Completed);
    assert_eq!(draw.total_bets, 1);
    assert_eq!(draw.total_payout_amount, dec!(400.00));
    assert!(store.completed_draws_with_active_bets().await.unwrap().is_empty());

    let entries = store.ledger_for_bet(bet_id).await.unwrap();
    let kinds: Vec<_> = entries.iter().map(|e| e.entry_type).collect();
    assert_eq!(kinds, vec![TransactionType::Stake, TransactionType::Win]);

    let paid = store.commit_payout_mark(bet_id, Utc::now()).await.unwrap();
    assert!(paid.is_applied());
    let again = store.commit_payout_mark(bet_id, Utc::now()).await.unwrap();
    assert_eq!(again, CommitOutcome::Conflict { current: BetStatus::Paid });
}

#[tokio::test]
async fn test_draw_transitions_are_guarded() {
    let dir = tempdir().expect("create temp db dir");
    let store = RocksStore::open(&storage_at(dir.path())).unwrap();
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
    store
        .insert_draw(Draw::scheduled(7, "NLA-0007", 1, at, at + Duration::hours(1)))
        .await
        .unwrap();

    assert!(store.insert_draw(Draw::scheduled(7, "NLA-0007", 1, at, at)).await.is_err());
    assert!(store
        .transition_draw(7, DrawStatus::Open, DrawStatus::Closed)
        .await
        .is_err());

    let open = store
        .transition_draw(7, DrawStatus::Scheduled, DrawStatus::Open)
        .await
        .unwrap();
    assert_eq!(open.status, DrawStatus::Open);
    assert_eq!(store.list_draws().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_debit_never_overdraws() {
    let dir = tempdir().expect("create temp db dir");
    let store = RocksStore::open(&storage_at(dir.path())).unwrap();
    store.open_account(3, dec!(5.00)).await.unwrap();

    assert!(store.debit(3, dec!(6.00)).await.is_err());
    assert_eq!(store.debit(3, dec!(5.00)).await.unwrap(), dec!(0.00));
    assert_eq!(store.credit(3, dec!(2.50)).await.unwrap(), dec!(2.50));
}

/// RocksDB-backed draw 1 (open 09:00-18:00) with users 1 and 2 funded at 100.00.
struct RocksWorld {
    _dir: TempDir,
    store: Arc<dyn Store>,
    clock: Arc<ManualClock>,
    references: Arc<ReferenceGenerator>,
    draws: DrawLifecycle,
    placement: BetPlacement,
}

impl RocksWorld {
    async fn new(seed: u64) -> Self {
        let dir = tempdir().expect("create temp db dir");
        let start: DateTime<Utc> = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let store: Arc<dyn Store> = Arc::new(RocksStore::open(&storage_at(dir.path())).unwrap());
        Catalog::standard().seed(store.as_ref()).await.unwrap();
        store
            .insert_draw(Draw::scheduled(
                1,
                "NLA-0001",
                1,
                start + Duration::hours(1),
                start + Duration::hours(10),
            ))
            .await
            .unwrap();
        store.open_account(1, dec!(100.00)).await.unwrap();
        store.open_account(2, dec!(100.00)).await.unwrap();

        let clock = Arc::new(ManualClock::new(start + Duration::hours(2)));
        let references = Arc::new(ReferenceGenerator::new(clock.clone(), Box::new(StdRng::seed_from_u64(seed))));
        let draws = DrawLifecycle::new(store.clone(), clock.clone(), references.clone(), 1);
        let placement = BetPlacement::new(store.clone(), clock.clone(), references.clone(), 1);
        draws.open(1).await.unwrap();

        Self {
            _dir: dir,
            store,
            clock,
            references,
            draws,
            placement,
        }
    }

    async fn place(&self, user_id: UserId, bet_type_id: BetTypeId, numbers: Vec<LottoNumber>, stake: Decimal) -> Bet {
        self.placement
            .place(PlaceBetRequest {
                user_id,
                draw_id: 1,
                bet_type_id,
                selected_numbers: numbers,
                stake_amount: stake,
            })
            .await
            .unwrap()
    }

    async fn wins_for(&self, user_id: UserId) -> usize {
        self.store
            .ledger_for_user(user_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.entry_type == TransactionType::Win)
            .count()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_engines_pay_each_bet_once() {
    let world = RocksWorld::new(21).await;
    for number in [42, 7, 11, 19] {
        world.place(1, 1, vec![number], dec!(10.00)).await;
    }
    let pair = world.place(2, 2, vec![17, 88], dec!(2.00)).await;
    world.draws.close(1).await.unwrap();
    world.draws.publish_results(1, vec![42, 17, 88, 23, 5]).await.unwrap();

    let config = LottoConfig::testing();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::new(SettlementEngine::new(
                world.store.clone(),
                Arc::new(NoopSink),
                world.clock.clone(),
                world.references.clone(),
                &config,
            ));
            tokio::spawn(async move { engine.settle_draw(1).await })
        })
        .collect();

    let mut winners = 0;
    let mut settled = 0;
    for handle in handles {
        if let DrawSettlement::Settled(summary) = handle.await.unwrap().unwrap() {
            assert!(summary.failures.is_empty());
            winners += summary.winners;
            settled += summary.winners + summary.losers;
        }
    }
    assert_eq!(winners, 2);
    assert_eq!(settled, 5);

    // 100 - 4 * 10 + 400 and 100 - 2 + 480
    assert_eq!(world.store.get_balance(1).await.unwrap(), dec!(460.00));
    assert_eq!(world.store.get_balance(2).await.unwrap(), dec!(578.00));
    assert_eq!(world.wins_for(1).await, 1);
    assert_eq!(world.wins_for(2).await, 1);
    assert_eq!(world.store.get_bet(pair.id).await.unwrap().unwrap().status, BetStatus::Won);

    let draw = world.store.get_draw(1).await.unwrap().unwrap();
    assert_eq!(draw.total_payout_amount, dec!(880.00));
    assert!(world.store.active_bets_for_draw(1).await.unwrap().is_empty());
    assert!(world.store.completed_draws_with_active_bets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_draw_refunds_on_rocks() {
    let world = RocksWorld::new(22).await;
    let first = world.place(1, 1, vec![42], dec!(10.00)).await;
    let second = world.place(2, 3, vec![1, 2, 3], dec!(5.00)).await;
    assert_eq!(world.store.get_balance(1).await.unwrap(), dec!(90.00));

    let report = world.draws.cancel_draw(1).await.unwrap();
    assert_eq!(report.refunded_bets, 2);
    assert_eq!(report.refunded_amount, dec!(15.00));
    assert_eq!(report.conflicts, 0);

    assert_eq!(world.store.get_draw(1).await.unwrap().unwrap().status, DrawStatus::Cancelled);
    assert_eq!(world.store.get_balance(1).await.unwrap(), dec!(100.00));
    assert_eq!(world.store.get_balance(2).await.unwrap(), dec!(100.00));
    for bet in [&first, &second] {
        assert_eq!(world.store.get_bet(bet.id).await.unwrap().unwrap().status, BetStatus::Cancelled);
        let kinds: Vec<_> = world
            .store
            .ledger_for_bet(bet.id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.entry_type)
            .collect();
        assert_eq!(kinds, vec![TransactionType::Stake, TransactionType::Refund]);
    }
    assert!(world.store.active_bets_for_draw(1).await.unwrap().is_empty());

    let again = world
        .store
        .commit_refund(RefundUnit {
            bet_id: first.id,
            reference: "RFD-REPEAT".to_string(),
            processed_at: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(again, CommitOutcome::Conflict { current: BetStatus::Cancelled });
    assert_eq!(world.draws.cancel_draw(1).await.unwrap().refunded_bets, 0);
    assert_eq!(world.store.get_balance(1).await.unwrap(), dec!(100.00));
}
