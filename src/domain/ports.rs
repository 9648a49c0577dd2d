//! Domain Ports (Port/Adapter Pattern)
//!
//! The guard components depend only on these traits. Infrastructure adapters
//! (a Redis-compatible store, a relational database, or the in-memory
//! adapters in [`crate::adapters`]) implement them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Guard Components                        │
//! │  ExistenceFilter │ DistributedLock │ IdGenerator            │
//! │  CacheRebuildPolicy │ InventoryAdmissionController          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Ports (Traits)                          │
//! │  KvStore │ RecordSource │ ShopRepository │ VoucherRepository│
//! │  OrderRepository │ ShopTypeRepository │ EventPublisher      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;

use super::events::DomainEvent;
use super::model::{
    BuyerId, SeckillVoucher, Shop, ShopId, ShopType, VoucherId, VoucherOrder,
};
use crate::error::Result;

// =============================================================================
// Shared Key-Value Store Port
// =============================================================================

/// Remaining lifetime of a key in the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist
    Missing,
    /// Key exists without an expiry
    Persistent,
    /// Key expires after the given duration
    Expires(Duration),
}

/// Port for the shared key-value store every instance coordinates through.
///
/// Each method is a single round trip and atomic per key, mirroring the
/// Redis commands the guard was designed around (`GET`, `SET EX`, `SET NX EX`,
/// `DEL`, compare-and-delete script, `SETBIT`, `GETBIT`, `INCR`, `TTL`).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Write a value only if the key is absent. Returns true when written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete a key. Returns true if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete a key only if its current value equals `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// Set or clear a bit, returning the previous bit value.
    async fn set_bit(&self, key: &str, offset: u64, value: bool) -> Result<bool>;

    /// Read a bit. Missing keys read as all zeroes.
    async fn get_bit(&self, key: &str, offset: u64) -> Result<bool>;

    /// Atomically increment an integer counter, creating it at 0 first.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> Result<KeyTtl>;
}

// =============================================================================
// Durable Record Store Ports
// =============================================================================

/// Point lookup used by the read-through cache to rebuild an entry.
#[async_trait]
pub trait RecordSource<K, T>: Send + Sync {
    /// Load the authoritative record, or `None` if it does not exist.
    async fn load(&self, id: &K) -> Result<Option<T>>;
}

/// Port for shop records.
#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// Point lookup.
    async fn find_by_id(&self, id: ShopId) -> Result<Option<Shop>>;

    /// Insert a new shop.
    async fn insert(&self, shop: Shop) -> Result<()>;

    /// Update an existing shop. Returns false when the shop does not exist.
    async fn update(&self, shop: &Shop) -> Result<bool>;

    /// Enumerate every shop ID (filter bootstrap).
    async fn all_ids(&self) -> Result<Vec<ShopId>>;
}

/// Port for shop categories.
#[async_trait]
pub trait ShopTypeRepository: Send + Sync {
    /// Range scan of all categories ordered by ascending `sort`.
    async fn list_by_sort(&self) -> Result<Vec<ShopType>>;
}

/// Port for seckill voucher inventory.
#[async_trait]
pub trait VoucherRepository: Send + Sync {
    /// Point lookup.
    async fn find_seckill(&self, id: VoucherId) -> Result<Option<SeckillVoucher>>;

    /// `stock = stock - 1 WHERE voucher_id = ? AND stock > 0`.
    ///
    /// Returns true when exactly one row was updated.
    async fn decrement_stock(&self, id: VoucherId) -> Result<bool>;
}

/// Port for voucher orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Append a new order.
    async fn save(&self, order: &VoucherOrder) -> Result<()>;

    /// Whether the buyer already holds an order for the voucher.
    async fn exists_for(&self, buyer: BuyerId, voucher: VoucherId) -> Result<bool>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish several events in order.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}
