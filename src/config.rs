//! Configuration for the guard components.
//!
//! Every knob has a default matching the production deployment; the binary
//! overlays an optional YAML file and CLI flags on top.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::RebuildStrategy;
use crate::error::{Error, Result};
use crate::filter::FilterSizing;

// =============================================================================
// Key Prefixes
// =============================================================================

/// Cached shop records (`cache:shop:<id>`)
pub const CACHE_SHOP_PREFIX: &str = "cache:shop:";

/// Cached category list
pub const CACHE_SHOP_TYPE_KEY: &str = "cache:shop-type:list";

/// Prefix applied by [`crate::lock::DistributedLock`] to every resource
pub const LOCK_PREFIX: &str = "lock:";

/// Existence filter over shop IDs
pub const FILTER_SHOP_KEY: &str = "bloom:shop";

/// Daily sequence counters (`icr:<partition>:<yyyy:MM:dd>`)
pub const COUNTER_PREFIX: &str = "icr:";

/// Lock resource prefix for cache rebuilds of shop records
pub const REBUILD_RESOURCE_PREFIX: &str = "shop:";

/// Lock resource prefix for per-buyer seckill admission
pub const ORDER_RESOURCE_PREFIX: &str = "order:";

// =============================================================================
// Keyspace
// =============================================================================

/// Namespacing for every key the guard writes to the shared store.
///
/// Two deployments (or two tests) sharing one store stay isolated as long as
/// their namespaces differ.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Keyspace {
    /// Optional namespace, joined to keys with `:`
    pub namespace: Option<String>,
}

impl Keyspace {
    /// Keyspace with a namespace prefix
    pub fn namespaced(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }

    /// Qualify a raw key with the namespace.
    pub fn key(&self, raw: &str) -> String {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => format!("{}:{}", ns, raw),
            _ => raw.to_string(),
        }
    }

    /// Cache key for a record id under a prefix.
    pub fn cache_key(&self, prefix: &str, id: &str) -> String {
        self.key(&format!("{}{}", prefix, id))
    }

    /// Lock key for a resource.
    pub fn lock_key(&self, resource: &str) -> String {
        self.key(&format!("{}{}", LOCK_PREFIX, resource))
    }

    /// Sequence counter key for a partition and day (`yyyy:MM:dd`).
    pub fn counter_key(&self, partition: &str, day: &str) -> String {
        self.key(&format!("{}{}:{}", COUNTER_PREFIX, partition, day))
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Read-through cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Rebuild strategy used on a miss
    pub strategy: RebuildStrategy,
    /// Physical TTL of populated shop entries (seconds)
    pub ttl_secs: u64,
    /// Physical TTL of tombstones (seconds)
    pub tombstone_ttl_secs: u64,
    /// Logical lifetime of entries under the logical-expiration strategy (seconds)
    pub logical_ttl_secs: u64,
    /// TTL of the rebuild lock (seconds)
    pub rebuild_lock_ttl_secs: u64,
    /// Sleep between lock attempts under the mutex strategy (milliseconds)
    pub retry_interval_ms: u64,
    /// Waits on a busy rebuild lock before giving up under the mutex strategy
    pub max_retries: u32,
    /// Physical TTL of the cached category list (seconds)
    pub shop_type_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            strategy: RebuildStrategy::Mutex,
            ttl_secs: 30 * 60,
            tombstone_ttl_secs: 2 * 60,
            logical_ttl_secs: 10,
            rebuild_lock_ttl_secs: 10,
            retry_interval_ms: 50,
            max_retries: 10,
            shop_type_ttl_secs: 30 * 60,
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_secs)
    }

    pub fn logical_ttl(&self) -> Duration {
        Duration::from_secs(self.logical_ttl_secs)
    }

    pub fn rebuild_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.rebuild_lock_ttl_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn shop_type_ttl(&self) -> Duration {
        Duration::from_secs(self.shop_type_ttl_secs)
    }
}

// =============================================================================
// Filter Settings
// =============================================================================

/// Existence filter sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Number of bits in the filter
    pub bit_width: u64,
    /// Number of hash functions
    pub hash_count: u32,
    /// When set together with `false_positive_rate`, overrides the fixed sizing
    pub expected_items: Option<u64>,
    /// Target false-positive rate for derived sizing
    pub false_positive_rate: Option<f64>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        let baseline = FilterSizing::default();
        Self {
            bit_width: baseline.bit_width(),
            hash_count: baseline.hash_count(),
            expected_items: None,
            false_positive_rate: None,
        }
    }
}

impl FilterSettings {
    /// Resolve the effective sizing.
    pub fn sizing(&self) -> Result<FilterSizing> {
        match (self.expected_items, self.false_positive_rate) {
            (Some(n), Some(p)) => FilterSizing::for_capacity(n, p),
            (None, None) => FilterSizing::new(self.bit_width, self.hash_count),
            _ => Err(Error::Config(
                "expected_items and false_positive_rate must be set together".to_string(),
            )),
        }
    }
}

// =============================================================================
// Seckill Settings
// =============================================================================

/// Flash-sale admission settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeckillSettings {
    /// TTL of the per-buyer admission lock (seconds)
    pub buyer_lock_ttl_secs: u64,
    /// ID generator partition for orders
    pub order_partition: String,
}

impl Default for SeckillSettings {
    fn default() -> Self {
        Self {
            buyer_lock_ttl_secs: 1200,
            order_partition: "order".to_string(),
        }
    }
}

impl SeckillSettings {
    pub fn buyer_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.buyer_lock_ttl_secs)
    }
}

// =============================================================================
// Top-level Config
// =============================================================================

/// Complete guard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub keyspace: Keyspace,
    pub cache: CacheSettings,
    pub filter: FilterSettings,
    pub seckill: SeckillSettings,
}

impl GuardConfig {
    /// Parse a YAML document; missing fields fall back to defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break the guard's invariants.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_retries == 0 {
            return Err(Error::Config("cache.max_retries must be at least 1".into()));
        }
        if self.cache.tombstone_ttl_secs == 0 || self.cache.rebuild_lock_ttl_secs == 0 {
            return Err(Error::Config(
                "cache tombstone and rebuild lock TTLs must be non-zero".into(),
            ));
        }
        if self.seckill.buyer_lock_ttl_secs == 0 {
            return Err(Error::Config("seckill.buyer_lock_ttl_secs must be non-zero".into()));
        }
        if self.seckill.order_partition.is_empty() {
            return Err(Error::Config("seckill.order_partition must not be empty".into()));
        }
        self.filter.sizing()?;
        Ok(())
    }
}
