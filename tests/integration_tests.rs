//! ShopGuard Integration Tests
//!
//! End-to-end checks through the public API:
//! - Existence filter in front of the shop cache
//! - Cache rebuild under concurrency (mutex and logical expiration)
//! - Distributed ID ordering
//! - Flash-sale admission under contention

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use shopguard::adapters::{
    InMemoryKvStore, InMemoryOrderRepository, InMemoryShopRepository, InMemoryVoucherRepository,
};
use shopguard::clock::ManualClock;
use shopguard::config::{CacheSettings, GuardConfig, SeckillSettings};
use shopguard::domain::model::{SeckillVoucher, Shop, ShopId, VoucherId};
use shopguard::service::{FilterBootstrap, ShopService};
use shopguard::{DistributedLock, ExistenceFilter, IdGenerator};

fn shop_config(strategy: shopguard::RebuildStrategy) -> GuardConfig {
    GuardConfig {
        cache: CacheSettings {
            strategy,
            retry_interval_ms: 5,
            max_retries: 200,
            ..CacheSettings::default()
        },
        ..GuardConfig::default()
    }
}

struct ShopStack {
    store: Arc<InMemoryKvStore>,
    repo: Arc<InMemoryShopRepository>,
    clock: Arc<ManualClock>,
    service: Arc<ShopService>,
}

async fn shop_stack(config: &GuardConfig) -> ShopStack {
    let store = Arc::new(InMemoryKvStore::new());
    let repo = Arc::new(InMemoryShopRepository::with_shops(
        (1..=10).map(|i| Shop::new(i, format!("Shop {}", i), 1)),
    ));
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let locks = Arc::new(DistributedLock::new(store.clone(), config.keyspace.clone()));
    let filter = Arc::new(ExistenceFilter::new(
        store.clone(),
        config.keyspace.clone(),
        config.filter.sizing().unwrap(),
    ));

    let report = FilterBootstrap::new(repo.clone(), filter.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(report.added, 10);

    let service = ShopService::new(repo.clone(), store.clone(), locks, filter, config)
        .with_clock(clock.clone());
    ShopStack {
        store,
        repo,
        clock,
        service: Arc::new(service),
    }
}

// =============================================================================
// Existence Filter + Cache
// =============================================================================

mod cache_tests {
    use super::*;
    use shopguard::{AbsentReason, LookupOutcome, RebuildStrategy};

    #[tokio::test]
    async fn test_unknown_shop_never_reaches_database() {
        let stack = shop_stack(&shop_config(RebuildStrategy::Mutex)).await;

        let outcome = stack.service.query_by_id(ShopId(42)).await.unwrap();
        assert_eq!(outcome, LookupOutcome::Absent(AbsentReason::Filtered));
        assert!(outcome.is_not_found());
        assert_eq!(stack.repo.lookup_count(), 0);
        assert!(stack.store.stats().keys > 0);
    }

    #[tokio::test]
    async fn test_round_trip_then_served_from_cache() {
        let stack = shop_stack(&shop_config(RebuildStrategy::Mutex)).await;

        let first = stack.service.query_by_id(ShopId(3)).await.unwrap();
        assert_eq!(first.value().map(|s| s.name.as_str()), Some("Shop 3"));
        for _ in 0..5 {
            assert!(stack.service.query_by_id(ShopId(3)).await.unwrap().is_hit());
        }
        assert_eq!(stack.repo.lookup_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_rebuild_after_expiry() {
        let stack = shop_stack(&shop_config(RebuildStrategy::Mutex)).await;
        stack.repo.set_latency(Some(Duration::from_millis(30)));

        assert!(stack.service.query_by_id(ShopId(1)).await.unwrap().is_hit());
        stack
            .store
            .expire_now(&stack.service.cache().cache_key(&ShopId(1)));
        let before = stack.repo.lookup_count();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = stack.service.clone();
                tokio::spawn(async move { service.query_by_id(ShopId(1)).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_hit());
        }

        assert_eq!(stack.repo.lookup_count() - before, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_logical_expiry_serves_stale_and_refreshes_once() {
        let config = shop_config(RebuildStrategy::LogicalExpiration);
        let stack = shop_stack(&config).await;
        let cache = stack.service.cache();

        assert!(cache.warm_up(&ShopId(2), Duration::from_secs(10)).await.unwrap());
        let mut renamed = Shop::new(2, "Shop 2 (renovated)", 1);
        renamed.score = 48;
        stack.repo.put(renamed);
        stack.clock.advance(chrono::Duration::seconds(11));
        let before = stack.repo.lookup_count();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = stack.service.clone();
                tokio::spawn(async move { service.query_by_id(ShopId(2)).await })
            })
            .collect();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            assert!(outcome.is_hit());
        }
        cache.wait_background().await;

        assert_eq!(stack.repo.lookup_count() - before, 1);
        let refreshed = stack.service.query_by_id(ShopId(2)).await.unwrap();
        assert_eq!(
            refreshed.value().map(|s| s.name.as_str()),
            Some("Shop 2 (renovated)")
        );
    }

    #[tokio::test]
    async fn test_deleted_shop_is_tombstoned() {
        let stack = shop_stack(&shop_config(RebuildStrategy::Mutex)).await;
        stack.repo.remove(ShopId(5));

        let first = stack.service.query_by_id(ShopId(5)).await.unwrap();
        assert_eq!(first, LookupOutcome::Absent(AbsentReason::NotInStore));
        let second = stack.service.query_by_id(ShopId(5)).await.unwrap();
        assert_eq!(second, LookupOutcome::Absent(AbsentReason::Tombstone));
        assert_eq!(stack.repo.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_update_is_visible_on_next_read() {
        let stack = shop_stack(&shop_config(RebuildStrategy::Mutex)).await;
        assert!(stack.service.query_by_id(ShopId(4)).await.unwrap().is_hit());

        let mut shop = Shop::new(4, "Shop 4 v2", 1);
        shop.avg_price = 120;
        stack.service.update(&shop).await.unwrap();

        let outcome = stack.service.query_by_id(ShopId(4)).await.unwrap();
        assert_eq!(outcome.value().map(|s| s.avg_price), Some(120));
    }

    #[tokio::test]
    async fn test_created_shop_passes_filter() {
        let stack = shop_stack(&shop_config(RebuildStrategy::Mutex)).await;
        let id = stack
            .service
            .create(Shop::new(77, "Late Arrival", 2))
            .await
            .unwrap();
        assert_eq!(id, ShopId(77));
        assert!(stack.service.query_by_id(id).await.unwrap().is_hit());
    }
}

// =============================================================================
// ID Generator
// =============================================================================

mod idgen_tests {
    use super::*;
    use shopguard::config::Keyspace;
    use shopguard::idgen::decompose;

    #[tokio::test]
    async fn test_ids_increase_across_days() {
        let store = Arc::new(InMemoryKvStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ids = IdGenerator::new(store, clock.clone(), Keyspace::default());

        let mut previous = 0;
        for round in 0..3 {
            for _ in 0..50 {
                let id = ids.next_id("order").await.unwrap();
                assert!(id > previous, "round {}: {} <= {}", round, id, previous);
                previous = id;
            }
            clock.advance(chrono::Duration::days(1));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ids_are_unique() {
        let store = Arc::new(InMemoryKvStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ids = Arc::new(IdGenerator::new(store, clock, Keyspace::default()));

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let ids = ids.clone();
                tokio::spawn(async move { ids.next_id("order").await.unwrap() })
            })
            .collect();
        let mut minted = Vec::new();
        for handle in handles {
            minted.push(handle.await.unwrap());
        }
        minted.sort_unstable();
        minted.dedup();
        assert_eq!(minted.len(), 200);

        let sequences: Vec<i64> = minted.iter().map(|id| decompose(*id).1).collect();
        assert_eq!(sequences.first(), Some(&1));
        assert_eq!(sequences.last(), Some(&200));
    }
}

// =============================================================================
// Flash-Sale Admission
// =============================================================================

mod seckill_tests {
    use super::*;
    use shopguard::config::Keyspace;
    use shopguard::domain::model::BuyerId;
    use shopguard::{AdmissionOutcome, InventoryAdmissionController, Rejection};

    const VOUCHER: VoucherId = VoucherId(9);

    struct Sale {
        vouchers: Arc<InMemoryVoucherRepository>,
        orders: Arc<InMemoryOrderRepository>,
        controller: Arc<InventoryAdmissionController>,
    }

    fn sale(stock: u32) -> Sale {
        let store = Arc::new(InMemoryKvStore::new());
        let now = Utc::now();
        let vouchers = Arc::new(InMemoryVoucherRepository::with_vouchers([SeckillVoucher {
            voucher_id: VOUCHER,
            stock,
            begin_time: now - chrono::Duration::minutes(5),
            end_time: now + chrono::Duration::hours(1),
        }]));
        let orders = Arc::new(InMemoryOrderRepository::new());
        let locks = Arc::new(DistributedLock::new(store.clone(), Keyspace::default()));
        let ids = Arc::new(IdGenerator::new(
            store,
            Arc::new(shopguard::clock::SystemClock),
            Keyspace::default(),
        ));
        let controller = InventoryAdmissionController::new(
            vouchers.clone(),
            orders.clone(),
            locks,
            ids,
            SeckillSettings::default(),
        );
        Sale {
            vouchers,
            orders,
            controller: Arc::new(controller),
        }
    }

    async fn storm(sale: &Sale, buyers: impl IntoIterator<Item = u64>) -> Vec<AdmissionOutcome> {
        let handles: Vec<_> = buyers
            .into_iter()
            .map(|buyer| {
                let controller = sale.controller.clone();
                tokio::spawn(async move { controller.admit(VOUCHER, Some(BuyerId(buyer))).await })
            })
            .collect();
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }
        outcomes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_no_oversell_under_contention() {
        let sale = sale(10);
        let outcomes = storm(&sale, 1..=200).await;

        let admitted = outcomes.iter().filter(|o| o.is_admitted()).count();
        assert_eq!(admitted, 10);
        assert_eq!(sale.orders.len(), 10);
        assert_eq!(sale.vouchers.stock(VOUCHER), Some(0));
        assert!(outcomes
            .iter()
            .filter_map(|o| o.rejection())
            .all(|r| r == Rejection::OutOfStock));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_each_buyer_admitted_at_most_once() {
        let sale = sale(100);
        let buyers = (1..=20).flat_map(|b| std::iter::repeat(b).take(5));
        let outcomes = storm(&sale, buyers).await;

        assert_eq!(outcomes.iter().filter(|o| o.is_admitted()).count(), 20);
        assert_eq!(sale.vouchers.stock(VOUCHER), Some(80));

        let mut buyers: Vec<u64> = sale.orders.orders().iter().map(|o| o.buyer_id.0).collect();
        buyers.sort_unstable();
        buyers.dedup();
        assert_eq!(buyers.len(), 20);
        assert!(outcomes.iter().filter_map(|o| o.rejection()).all(|r| matches!(
            r,
            Rejection::DuplicateInProgress | Rejection::AlreadyPurchased
        )));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_unit_goes_to_one_buyer() {
        let sale = sale(1);
        let outcomes = storm(&sale, [1, 2]).await;

        assert_eq!(outcomes.iter().filter(|o| o.is_admitted()).count(), 1);
        assert_eq!(
            outcomes.iter().filter_map(|o| o.rejection()).collect::<Vec<_>>(),
            vec![Rejection::OutOfStock]
        );
        assert_eq!(sale.vouchers.stock(VOUCHER), Some(0));
    }

    #[tokio::test]
    async fn test_order_ids_are_distinct() {
        let sale = sale(5);
        let outcomes = storm(&sale, 1..=5).await;

        let mut ids: Vec<_> = outcomes.iter().filter_map(|o| o.order_id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 5);
    }
}
