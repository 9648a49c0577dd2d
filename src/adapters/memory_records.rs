//! In-Memory Record Store Adapters
//!
//! Durable-store ports backed by `DashMap` / `RwLock`. Lookup counters let
//! tests assert how many database round trips a read path performed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::domain::model::{
    BuyerId, SeckillVoucher, Shop, ShopId, ShopType, VoucherId, VoucherOrder,
};
use crate::domain::ports::{OrderRepository, ShopRepository, ShopTypeRepository, VoucherRepository};
use crate::error::{Error, Result};

// =============================================================================
// Shops
// =============================================================================

/// In-memory shop table
#[derive(Debug, Default)]
pub struct InMemoryShopRepository {
    shops: DashMap<ShopId, Shop>,
    lookups: AtomicU64,
    latency: RwLock<Option<Duration>>,
    offline: AtomicBool,
}

impl InMemoryShopRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository seeded with shops
    pub fn with_shops(shops: impl IntoIterator<Item = Shop>) -> Self {
        let repo = Self::new();
        for shop in shops {
            repo.shops.insert(shop.id, shop);
        }
        repo
    }

    /// Delay every point lookup, to model a slow database under a rebuild storm.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Simulate the database being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of point lookups served so far
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Write a shop directly, bypassing the service layer.
    pub fn put(&self, shop: Shop) {
        self.shops.insert(shop.id, shop);
    }

    /// Remove a shop directly, bypassing the service layer.
    pub fn remove(&self, id: ShopId) -> Option<Shop> {
        self.shops.remove(&id).map(|(_, s)| s)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::RecordStore("shop table unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ShopRepository for InMemoryShopRepository {
    async fn find_by_id(&self, id: ShopId) -> Result<Option<Shop>> {
        self.check_online()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.read();
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        Ok(self.shops.get(&id).map(|s| s.clone()))
    }

    async fn insert(&self, shop: Shop) -> Result<()> {
        self.check_online()?;
        match self.shops.entry(shop.id) {
            Entry::Occupied(_) => Err(Error::RecordStore(format!("duplicate shop id {}", shop.id))),
            Entry::Vacant(slot) => {
                slot.insert(shop);
                Ok(())
            }
        }
    }

    async fn update(&self, shop: &Shop) -> Result<bool> {
        self.check_online()?;
        match self.shops.get_mut(&shop.id) {
            Some(mut existing) => {
                *existing = shop.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn all_ids(&self) -> Result<Vec<ShopId>> {
        self.check_online()?;
        let mut ids: Vec<ShopId> = self.shops.iter().map(|e| *e.key()).collect();
        ids.sort();
        Ok(ids)
    }
}

// =============================================================================
// Shop Types
// =============================================================================

/// In-memory category table
#[derive(Debug, Default)]
pub struct InMemoryShopTypeRepository {
    types: RwLock<Vec<ShopType>>,
    scans: AtomicU64,
}

impl InMemoryShopTypeRepository {
    /// Create a repository seeded with categories (in any order)
    pub fn with_types(types: Vec<ShopType>) -> Self {
        Self {
            types: RwLock::new(types),
            scans: AtomicU64::new(0),
        }
    }

    /// Number of range scans served so far
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShopTypeRepository for InMemoryShopTypeRepository {
    async fn list_by_sort(&self) -> Result<Vec<ShopType>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let mut types = self.types.read().clone();
        types.sort_by_key(|t| (t.sort, t.id));
        Ok(types)
    }
}

// =============================================================================
// Seckill Vouchers
// =============================================================================

/// In-memory seckill voucher table
#[derive(Debug, Default)]
pub struct InMemoryVoucherRepository {
    vouchers: DashMap<VoucherId, SeckillVoucher>,
    decrements: AtomicU64,
}

impl InMemoryVoucherRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository seeded with vouchers
    pub fn with_vouchers(vouchers: impl IntoIterator<Item = SeckillVoucher>) -> Self {
        let repo = Self::new();
        for voucher in vouchers {
            repo.vouchers.insert(voucher.voucher_id, voucher);
        }
        repo
    }

    /// Current stock, if the voucher exists
    pub fn stock(&self, id: VoucherId) -> Option<u32> {
        self.vouchers.get(&id).map(|v| v.stock)
    }

    /// Number of successful conditional decrements
    pub fn decrement_count(&self) -> u64 {
        self.decrements.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoucherRepository for InMemoryVoucherRepository {
    async fn find_seckill(&self, id: VoucherId) -> Result<Option<SeckillVoucher>> {
        Ok(self.vouchers.get(&id).map(|v| v.clone()))
    }

    async fn decrement_stock(&self, id: VoucherId) -> Result<bool> {
        // The shard write lock makes check-and-decrement a single atomic step.
        match self.vouchers.get_mut(&id) {
            Some(mut voucher) if voucher.stock > 0 => {
                voucher.stock -= 1;
                self.decrements.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// In-memory order table
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<Vec<VoucherOrder>>,
}

impl InMemoryOrderRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted orders
    pub fn orders(&self) -> Vec<VoucherOrder> {
        self.orders.read().clone()
    }

    /// Number of persisted orders
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether no order was persisted
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &VoucherOrder) -> Result<()> {
        let mut orders = self.orders.write();
        if orders.iter().any(|o| o.id == order.id) {
            return Err(Error::RecordStore(format!("duplicate order id {}", order.id)));
        }
        orders.push(order.clone());
        Ok(())
    }

    async fn exists_for(&self, buyer: BuyerId, voucher: VoucherId) -> Result<bool> {
        Ok(self
            .orders
            .read()
            .iter()
            .any(|o| o.buyer_id == buyer && o.voucher_id == voucher))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::OrderId;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;

    fn voucher(id: u64, stock: u32) -> SeckillVoucher {
        let now = Utc::now();
        SeckillVoucher {
            voucher_id: VoucherId(id),
            stock,
            begin_time: now - ChronoDuration::hours(1),
            end_time: now + ChronoDuration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_shop_lookup_counts() {
        let repo = InMemoryShopRepository::with_shops(vec![Shop::new(1, "Tea House", 1)]);
        assert!(repo.find_by_id(ShopId(1)).await.unwrap().is_some());
        assert!(repo.find_by_id(ShopId(2)).await.unwrap().is_none());
        assert_eq!(repo.lookup_count(), 2);
    }

    #[tokio::test]
    async fn test_shop_update_missing() {
        let repo = InMemoryShopRepository::new();
        assert!(!repo.update(&Shop::new(5, "Nowhere", 1)).await.unwrap());
        repo.insert(Shop::new(5, "Somewhere", 1)).await.unwrap();
        assert!(repo.update(&Shop::new(5, "Renamed", 1)).await.unwrap());
        assert_eq!(
            repo.find_by_id(ShopId(5)).await.unwrap().unwrap().name,
            "Renamed"
        );
        assert!(repo.insert(Shop::new(5, "Dup", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_shop_types_sorted() {
        let repo = InMemoryShopTypeRepository::with_types(vec![
            ShopType { id: 1, name: "KTV".into(), icon: "ktv.png".into(), sort: 3 },
            ShopType { id: 2, name: "Food".into(), icon: "food.png".into(), sort: 1 },
            ShopType { id: 3, name: "Spa".into(), icon: "spa.png".into(), sort: 2 },
        ]);
        let names: Vec<String> = repo
            .list_by_sort()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Food", "Spa", "KTV"]);
        assert_eq!(repo.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_conditional_decrement_never_negative() {
        let repo = Arc::new(InMemoryVoucherRepository::with_vouchers(vec![voucher(1, 5)]));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.decrement_stock(VoucherId(1)).await.unwrap()
            }));
        }
        let mut successes = 0;
        for h in handles {
            if h.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 5);
        assert_eq!(repo.stock(VoucherId(1)), Some(0));
        assert!(!repo.decrement_stock(VoucherId(99)).await.unwrap());
    }

    #[tokio::test]
    async fn test_orders() {
        let repo = InMemoryOrderRepository::new();
        let order = VoucherOrder::unpaid(OrderId(1), BuyerId(7), VoucherId(3), Utc::now());
        repo.save(&order).await.unwrap();
        assert!(repo.save(&order).await.is_err());
        assert!(repo.exists_for(BuyerId(7), VoucherId(3)).await.unwrap());
        assert!(!repo.exists_for(BuyerId(8), VoucherId(3)).await.unwrap());
        assert_eq!(repo.len(), 1);
    }
}
