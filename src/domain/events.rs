//! Domain Events
//!
//! Immutable records of things that happened in the guard: orders admitted
//! or rejected, cache entries rebuilt or invalidated, filter bootstraps.
//!
//! # Usage
//!
//! Domain events are used for:
//! - Audit logging of the seckill path
//! - Decoupling the guard from downstream consumers
//!
//! ```ignore
//! let event = DomainEvent::order_created(order_id, buyer_id, voucher_id);
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::model::{BuyerId, OrderId, VoucherId};

/// Domain event representing a significant occurrence in the guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Seckill Events
    // =========================================================================
    /// A buyer was admitted and an order persisted.
    OrderCreated {
        order_id: i64,
        buyer_id: u64,
        voucher_id: u64,
        timestamp: DateTime<Utc>,
    },

    /// An admission attempt was rejected.
    AdmissionRejected {
        buyer_id: Option<u64>,
        voucher_id: u64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Cache Events
    // =========================================================================
    /// A cache entry was rebuilt from the record store.
    CacheRebuilt {
        key: String,
        found: bool,
        background: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A cache entry was invalidated after a write.
    CacheInvalidated {
        key: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Filter Events
    // =========================================================================
    /// The existence filter was populated at startup.
    FilterPopulated {
        filter_key: String,
        item_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::OrderCreated { timestamp, .. } => *timestamp,
            DomainEvent::AdmissionRejected { timestamp, .. } => *timestamp,
            DomainEvent::CacheRebuilt { timestamp, .. } => *timestamp,
            DomainEvent::CacheInvalidated { timestamp, .. } => *timestamp,
            DomainEvent::FilterPopulated { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => "OrderCreated",
            DomainEvent::AdmissionRejected { .. } => "AdmissionRejected",
            DomainEvent::CacheRebuilt { .. } => "CacheRebuilt",
            DomainEvent::CacheInvalidated { .. } => "CacheInvalidated",
            DomainEvent::FilterPopulated { .. } => "FilterPopulated",
        }
    }

    /// Get the voucher ID if applicable.
    pub fn voucher_id(&self) -> Option<u64> {
        match self {
            DomainEvent::OrderCreated { voucher_id, .. } => Some(*voucher_id),
            DomainEvent::AdmissionRejected { voucher_id, .. } => Some(*voucher_id),
            _ => None,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    /// Create an OrderCreated event.
    pub fn order_created(order_id: OrderId, buyer_id: BuyerId, voucher_id: VoucherId) -> Self {
        DomainEvent::OrderCreated {
            order_id: order_id.get(),
            buyer_id: buyer_id.get(),
            voucher_id: voucher_id.get(),
            timestamp: Utc::now(),
        }
    }

    /// Create an AdmissionRejected event.
    pub fn admission_rejected(
        buyer_id: Option<BuyerId>,
        voucher_id: VoucherId,
        reason: impl Into<String>,
    ) -> Self {
        DomainEvent::AdmissionRejected {
            buyer_id: buyer_id.map(|b| b.get()),
            voucher_id: voucher_id.get(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a CacheRebuilt event.
    pub fn cache_rebuilt(
        key: impl Into<String>,
        found: bool,
        background: bool,
        duration: Duration,
    ) -> Self {
        DomainEvent::CacheRebuilt {
            key: key.into(),
            found,
            background,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    /// Create a CacheInvalidated event.
    pub fn cache_invalidated(key: impl Into<String>) -> Self {
        DomainEvent::CacheInvalidated {
            key: key.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a FilterPopulated event.
    pub fn filter_populated(filter_key: impl Into<String>, item_count: usize) -> Self {
        DomainEvent::FilterPopulated {
            filter_key: filter_key.into(),
            item_count,
            timestamp: Utc::now(),
        }
    }
}
