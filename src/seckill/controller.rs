//! Inventory Admission Controller
//!
//! The flash-sale order path: validates the request, serializes each buyer
//! through a per-buyer lock, and relies on the record store's conditional
//! decrement alone to prevent oversell.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::metrics::AdmissionMetrics;
use super::rejection::{AdmissionOutcome, Rejection};
use crate::clock::{Clock, SystemClock};
use crate::config::{SeckillSettings, ORDER_RESOURCE_PREFIX};
use crate::domain::events::DomainEvent;
use crate::domain::model::{BuyerId, OrderId, SaleWindow, SeckillVoucher, VoucherId, VoucherOrder};
use crate::domain::ports::{EventPublisher, OrderRepository, VoucherRepository};
use crate::error::Result;
use crate::idgen::IdGenerator;
use crate::lock::DistributedLock;

/// Admission controller for seckill vouchers.
pub struct InventoryAdmissionController {
    vouchers: Arc<dyn VoucherRepository>,
    orders: Arc<dyn OrderRepository>,
    locks: Arc<DistributedLock>,
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<dyn EventPublisher>>,
    metrics: Arc<AdmissionMetrics>,
    settings: SeckillSettings,
}

impl InventoryAdmissionController {
    pub fn new(
        vouchers: Arc<dyn VoucherRepository>,
        orders: Arc<dyn OrderRepository>,
        locks: Arc<DistributedLock>,
        ids: Arc<IdGenerator>,
        settings: SeckillSettings,
    ) -> Self {
        Self {
            vouchers,
            orders,
            locks,
            ids,
            clock: Arc::new(SystemClock),
            events: None,
            metrics: Arc::new(AdmissionMetrics::new()),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AdmissionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<AdmissionMetrics> {
        &self.metrics
    }

    /// Try to admit `buyer` for one unit of `voucher_id`.
    ///
    /// Rejections come back as `Ok(AdmissionOutcome::Rejected(_))`. Errors
    /// mean the shared store or record store failed; the buyer lock is
    /// released in every case once it was granted.
    pub async fn admit(
        &self,
        voucher_id: VoucherId,
        buyer: Option<BuyerId>,
    ) -> Result<AdmissionOutcome> {
        self.metrics.record_attempt();
        let result = self.admit_inner(voucher_id, buyer).await;

        match &result {
            Ok(AdmissionOutcome::Admitted(order_id)) => {
                self.metrics.record_admitted();
                info!(
                    voucher = %voucher_id,
                    buyer = ?buyer.map(|b| b.get()),
                    order = %order_id,
                    "Seckill order created"
                );
                if let Some(buyer) = buyer {
                    self.publish(DomainEvent::order_created(*order_id, buyer, voucher_id))
                        .await;
                }
            }
            Ok(AdmissionOutcome::Rejected(reason)) => {
                self.metrics.record_rejection(*reason);
                debug!(
                    voucher = %voucher_id,
                    buyer = ?buyer.map(|b| b.get()),
                    reason = reason.as_str(),
                    "Seckill admission rejected"
                );
                self.publish(DomainEvent::admission_rejected(buyer, voucher_id, reason.as_str()))
                    .await;
            }
            Err(e) => {
                self.metrics.record_error();
                warn!(voucher = %voucher_id, error = %e, "Seckill admission failed");
            }
        }
        result
    }

    async fn admit_inner(
        &self,
        voucher_id: VoucherId,
        buyer: Option<BuyerId>,
    ) -> Result<AdmissionOutcome> {
        let Some(buyer) = buyer else {
            return Ok(AdmissionOutcome::Rejected(Rejection::Unauthenticated));
        };

        let voucher = match self.vouchers.find_seckill(voucher_id).await? {
            Some(voucher) => voucher,
            None => return Ok(AdmissionOutcome::Rejected(Rejection::VoucherNotFound)),
        };
        if let Some(reason) = self.window_rejection(&voucher) {
            return Ok(AdmissionOutcome::Rejected(reason));
        }
        // Advisory only; the conditional decrement is what prevents oversell.
        if voucher.stock < 1 {
            return Ok(AdmissionOutcome::Rejected(Rejection::OutOfStock));
        }

        let resource = format!("{}{}", ORDER_RESOURCE_PREFIX, buyer);
        let Some(held) = self
            .locks
            .try_lock(&resource, self.settings.buyer_lock_ttl())
            .await?
        else {
            return Ok(AdmissionOutcome::Rejected(Rejection::DuplicateInProgress));
        };

        let result = self.admit_locked(voucher_id, buyer).await;

        let lock_key = held.key().to_string();
        if let Err(e) = held.unlock().await {
            warn!(lock = %lock_key, error = %e, "Failed to release buyer lock");
        }
        result
    }

    async fn admit_locked(&self, voucher_id: VoucherId, buyer: BuyerId) -> Result<AdmissionOutcome> {
        // Re-validate: the voucher may have changed while we waited for the lock.
        let voucher = match self.vouchers.find_seckill(voucher_id).await? {
            Some(voucher) => voucher,
            None => return Ok(AdmissionOutcome::Rejected(Rejection::VoucherNotFound)),
        };
        if let Some(reason) = self.window_rejection(&voucher) {
            return Ok(AdmissionOutcome::Rejected(reason));
        }

        if self.orders.exists_for(buyer, voucher_id).await? {
            return Ok(AdmissionOutcome::Rejected(Rejection::AlreadyPurchased));
        }

        if !self.vouchers.decrement_stock(voucher_id).await? {
            return Ok(AdmissionOutcome::Rejected(Rejection::OutOfStock));
        }

        let order = match self.mint_order(voucher_id, buyer).await {
            Ok(order) => order,
            Err(e) => {
                error!(
                    voucher = %voucher_id,
                    buyer = %buyer,
                    error = %e,
                    "Stock decremented but no order persisted"
                );
                return Err(e);
            }
        };
        Ok(AdmissionOutcome::Admitted(order.id))
    }

    async fn mint_order(&self, voucher_id: VoucherId, buyer: BuyerId) -> Result<VoucherOrder> {
        let id = self.ids.next_id(&self.settings.order_partition).await?;
        let order = VoucherOrder::unpaid(OrderId(id), buyer, voucher_id, self.clock.now());
        self.orders.save(&order).await?;
        Ok(order)
    }

    fn window_rejection(&self, voucher: &SeckillVoucher) -> Option<Rejection> {
        match voucher.window_state(self.clock.now()) {
            SaleWindow::NotStarted => Some(Rejection::NotStarted),
            SaleWindow::Ended => Some(Rejection::Ended),
            SaleWindow::Open => None,
        }
    }

    async fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event).await {
                warn!(error = %e, "Failed to publish admission event");
            }
        }
    }
}

impl std::fmt::Debug for InventoryAdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryAdmissionController")
            .field("settings", &self.settings)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        InMemoryEventCollector, InMemoryKvStore, InMemoryOrderRepository,
        InMemoryVoucherRepository,
    };
    use crate::clock::ManualClock;
    use crate::config::Keyspace;
    use crate::domain::model::{OrderStatus, PayType};
    use crate::domain::ports::KvStore;
    use crate::error::Error;
    use crate::idgen;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;

    const VOUCHER: VoucherId = VoucherId(10);

    struct Fixture {
        store: Arc<InMemoryKvStore>,
        vouchers: Arc<InMemoryVoucherRepository>,
        orders: Arc<InMemoryOrderRepository>,
        events: Arc<InMemoryEventCollector>,
        clock: Arc<ManualClock>,
        controller: Arc<InventoryAdmissionController>,
    }

    fn fixture(stock: u32) -> Fixture {
        let now = Utc.with_ymd_and_hms(2024, 11, 11, 0, 0, 5).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(InMemoryKvStore::new());
        let vouchers = Arc::new(InMemoryVoucherRepository::with_vouchers([SeckillVoucher {
            voucher_id: VOUCHER,
            stock,
            begin_time: now - Duration::minutes(5),
            end_time: now + Duration::hours(1),
        }]));
        let orders = Arc::new(InMemoryOrderRepository::new());
        let events = Arc::new(InMemoryEventCollector::new());
        let locks = Arc::new(DistributedLock::new(store.clone(), Keyspace::default()));
        let ids = Arc::new(IdGenerator::new(
            store.clone(),
            clock.clone(),
            Keyspace::default(),
        ));
        let controller = InventoryAdmissionController::new(
            vouchers.clone(),
            orders.clone(),
            locks,
            ids,
            SeckillSettings::default(),
        )
        .with_clock(clock.clone())
        .with_events(events.clone());
        Fixture {
            store,
            vouchers,
            orders,
            events,
            clock,
            controller: Arc::new(controller),
        }
    }

    #[tokio::test]
    async fn test_admit_creates_unpaid_order() {
        let f = fixture(5);

        let outcome = f.controller.admit(VOUCHER, Some(BuyerId(1))).await.unwrap();
        let order_id = outcome.order_id().unwrap();

        let orders = f.orders.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, order_id);
        assert_eq!(orders[0].buyer_id, BuyerId(1));
        assert_eq!(orders[0].pay_type, PayType::Balance);
        assert_eq!(orders[0].status, OrderStatus::Unpaid);
        assert_eq!(f.vouchers.stock(VOUCHER), Some(4));

        let (offset, sequence) = idgen::decompose(order_id.get());
        assert_eq!(offset, f.clock.now().timestamp() - idgen::EPOCH_SECONDS);
        assert_eq!(sequence, 1);

        assert!(f.store.get("lock:order:1").await.unwrap().is_none());
        assert_eq!(f.events.count_of("OrderCreated"), 1);
    }

    #[tokio::test]
    async fn test_precondition_rejections() {
        let f = fixture(5);

        assert_matches!(
            f.controller.admit(VOUCHER, None).await.unwrap(),
            AdmissionOutcome::Rejected(Rejection::Unauthenticated)
        );
        assert_matches!(
            f.controller.admit(VoucherId(404), Some(BuyerId(1))).await.unwrap(),
            AdmissionOutcome::Rejected(Rejection::VoucherNotFound)
        );

        f.clock.advance(Duration::minutes(-10));
        assert_matches!(
            f.controller.admit(VOUCHER, Some(BuyerId(1))).await.unwrap(),
            AdmissionOutcome::Rejected(Rejection::NotStarted)
        );

        f.clock.advance(Duration::hours(2));
        assert_matches!(
            f.controller.admit(VOUCHER, Some(BuyerId(1))).await.unwrap(),
            AdmissionOutcome::Rejected(Rejection::Ended)
        );

        assert!(f.orders.is_empty());
        assert_eq!(f.vouchers.stock(VOUCHER), Some(5));
        assert_eq!(f.controller.metrics().snapshot().total_rejected(), 4);
    }

    #[tokio::test]
    async fn test_out_of_stock_fast_path() {
        let f = fixture(0);
        assert_matches!(
            f.controller.admit(VOUCHER, Some(BuyerId(1))).await.unwrap(),
            AdmissionOutcome::Rejected(Rejection::OutOfStock)
        );
        assert_eq!(f.vouchers.decrement_count(), 0);
        assert!(f.store.get("lock:order:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_in_progress() {
        let f = fixture(5);
        let other = DistributedLock::new(f.store.clone(), Keyspace::default());
        let held = other
            .try_lock("order:1", std::time::Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();

        assert_matches!(
            f.controller.admit(VOUCHER, Some(BuyerId(1))).await.unwrap(),
            AdmissionOutcome::Rejected(Rejection::DuplicateInProgress)
        );
        assert_eq!(f.vouchers.stock(VOUCHER), Some(5));
        held.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_purchase_rejected() {
        let f = fixture(5);

        assert!(f.controller.admit(VOUCHER, Some(BuyerId(1))).await.unwrap().is_admitted());
        assert_matches!(
            f.controller.admit(VOUCHER, Some(BuyerId(1))).await.unwrap(),
            AdmissionOutcome::Rejected(Rejection::AlreadyPurchased)
        );
        assert_eq!(f.vouchers.stock(VOUCHER), Some(4));
        assert_eq!(f.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_stock_one_two_buyers() {
        let f = fixture(1);

        let a = {
            let c = f.controller.clone();
            tokio::spawn(async move { c.admit(VOUCHER, Some(BuyerId(1))).await.unwrap() })
        };
        let b = {
            let c = f.controller.clone();
            tokio::spawn(async move { c.admit(VOUCHER, Some(BuyerId(2))).await.unwrap() })
        };
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_admitted()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| o.rejection() == Some(Rejection::OutOfStock)));
        assert_eq!(f.orders.len(), 1);
        assert_eq!(f.vouchers.stock(VOUCHER), Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_oversell_under_concurrency() {
        let f = fixture(10);

        let mut handles = Vec::new();
        for buyer in 1..=100u64 {
            let c = f.controller.clone();
            handles.push(tokio::spawn(async move {
                c.admit(VOUCHER, Some(BuyerId(buyer))).await.unwrap()
            }));
        }
        let mut admitted = 0;
        for h in handles {
            match h.await.unwrap() {
                AdmissionOutcome::Admitted(_) => admitted += 1,
                AdmissionOutcome::Rejected(reason) => assert_eq!(reason, Rejection::OutOfStock),
            }
        }

        assert_eq!(admitted, 10);
        assert_eq!(f.orders.len(), 10);
        assert_eq!(f.vouchers.stock(VOUCHER), Some(0));
        let ids: HashSet<_> = f.orders.orders().iter().map(|o| o.id).collect();
        assert_eq!(ids.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_buyer_admitted_at_most_once() {
        let f = fixture(50);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let c = f.controller.clone();
            handles.push(tokio::spawn(async move {
                c.admit(VOUCHER, Some(BuyerId(7))).await.unwrap()
            }));
        }
        let mut admitted = 0;
        for h in handles {
            match h.await.unwrap() {
                AdmissionOutcome::Admitted(_) => admitted += 1,
                AdmissionOutcome::Rejected(reason) => assert!(matches!(
                    reason,
                    Rejection::DuplicateInProgress | Rejection::AlreadyPurchased
                )),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(f.vouchers.stock(VOUCHER), Some(49));
    }

    #[tokio::test]
    async fn test_error_after_lock_releases_it() {
        let f = fixture(5);
        let day = f.clock.now().format("%Y:%m:%d").to_string();
        f.store
            .set(&format!("icr:order:{}", day), &u32::MAX.to_string(), None)
            .await
            .unwrap();

        assert_matches!(
            f.controller.admit(VOUCHER, Some(BuyerId(3))).await,
            Err(Error::SequenceOverflow { .. })
        );
        assert!(f.store.get("lock:order:3").await.unwrap().is_none());
        assert_eq!(f.controller.metrics().snapshot().errors, 1);
    }

    /// Order store whose duplicate check (run under the buyer lock) is slow.
    struct SlowOrders {
        inner: InMemoryOrderRepository,
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl OrderRepository for SlowOrders {
        async fn save(&self, order: &VoucherOrder) -> Result<()> {
            self.inner.save(order).await
        }

        async fn exists_for(&self, buyer: BuyerId, voucher: VoucherId) -> Result<bool> {
            tokio::time::sleep(self.delay).await;
            self.inner.exists_for(buyer, voucher).await
        }
    }

    #[tokio::test]
    async fn test_cancelled_admission_frees_buyer() {
        let f = fixture(5);
        let slow = InventoryAdmissionController::new(
            f.vouchers.clone(),
            Arc::new(SlowOrders {
                inner: InMemoryOrderRepository::new(),
                delay: std::time::Duration::from_millis(200),
            }),
            Arc::new(DistributedLock::new(f.store.clone(), Keyspace::default())),
            Arc::new(IdGenerator::new(
                f.store.clone(),
                f.clock.clone(),
                Keyspace::default(),
            )),
            SeckillSettings::default(),
        )
        .with_clock(f.clock.clone());

        let timed_out = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            slow.admit(VOUCHER, Some(BuyerId(7))),
        )
        .await;
        assert!(timed_out.is_err());

        for _ in 0..100 {
            if f.store.get("lock:order:7").await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        assert!(f.store.get("lock:order:7").await.unwrap().is_none());
        assert_eq!(f.vouchers.stock(VOUCHER), Some(5));

        assert!(slow
            .admit(VOUCHER, Some(BuyerId(7)))
            .await
            .unwrap()
            .is_admitted());
        assert_eq!(f.vouchers.stock(VOUCHER), Some(4));
    }

    #[tokio::test]
    async fn test_store_outage_surfaces() {
        let f = fixture(5);
        f.store.set_offline(true);
        assert_matches!(
            f.controller.admit(VOUCHER, Some(BuyerId(1))).await,
            Err(Error::StoreUnavailable(_))
        );
        assert_eq!(f.vouchers.stock(VOUCHER), Some(5));
    }
}
