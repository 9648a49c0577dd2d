//! Existence Filter
//!
//! A Bloom filter stored as a bitmap in the shared store, so every instance
//! sees the same membership set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::sizing::FilterSizing;
use crate::config::Keyspace;
use crate::domain::ports::KvStore;
use crate::error::Result;

/// Probabilistic membership test over a known ID universe.
///
/// Never yields a false negative for an ID whose `add` completed. When the
/// store is unreachable, [`ExistenceFilter::might_contain`] fails open and
/// reports the ID as possibly present.
pub struct ExistenceFilter {
    store: Arc<dyn KvStore>,
    keyspace: Keyspace,
    sizing: FilterSizing,
    degraded_checks: AtomicU64,
}

impl ExistenceFilter {
    /// Create a filter over `store` with the given sizing.
    pub fn new(store: Arc<dyn KvStore>, keyspace: Keyspace, sizing: FilterSizing) -> Self {
        Self {
            store,
            keyspace,
            sizing,
            degraded_checks: AtomicU64::new(0),
        }
    }

    /// Create a filter with the baseline sizing (2^32 bits, 3 hashes).
    pub fn with_defaults(store: Arc<dyn KvStore>) -> Self {
        Self::new(store, Keyspace::default(), FilterSizing::default())
    }

    pub fn sizing(&self) -> FilterSizing {
        self.sizing
    }

    /// Number of membership checks answered "possibly present" because the
    /// store was unavailable.
    pub fn degraded_checks(&self) -> u64 {
        self.degraded_checks.load(Ordering::Relaxed)
    }

    /// Bit offsets derived for an ID, one per hash function.
    ///
    /// Hash function `i` is SHA-256 over the salt byte `i` followed by the ID;
    /// the first eight digest bytes (big-endian) are reduced modulo the width.
    pub fn bit_offsets(&self, id: &str) -> Vec<u64> {
        (0..self.sizing.hash_count())
            .map(|i| {
                let digest = Sha256::new()
                    .chain_update([i as u8])
                    .chain_update(id.as_bytes())
                    .finalize();
                let mut head = [0u8; 8];
                head.copy_from_slice(&digest[..8]);
                u64::from_be_bytes(head) % self.sizing.bit_width()
            })
            .collect()
    }

    /// Mark an ID present.
    pub async fn add(&self, filter_key: &str, id: &str) -> Result<()> {
        let key = self.keyspace.key(filter_key);
        for offset in self.bit_offsets(id) {
            self.store.set_bit(&key, offset, true).await?;
        }
        Ok(())
    }

    /// Mark many IDs present, one at a time.
    ///
    /// There is no atomicity across elements; a concurrent reader may see a
    /// partially populated filter. Returns the number of IDs added.
    pub async fn add_batch<I, S>(&self, filter_key: &str, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for id in ids {
            self.add(filter_key, id.as_ref()).await?;
            added += 1;
        }
        Ok(added)
    }

    /// False only if `id` was never added. Fails open on store errors.
    pub async fn might_contain(&self, filter_key: &str, id: &str) -> bool {
        let key = self.keyspace.key(filter_key);
        for offset in self.bit_offsets(id) {
            match self.store.get_bit(&key, offset).await {
                Ok(true) => continue,
                Ok(false) => {
                    debug!(filter = %key, id = %id, "Filter rejected id");
                    return false;
                }
                Err(e) => {
                    self.degraded_checks.fetch_add(1, Ordering::Relaxed);
                    warn!(filter = %key, id = %id, error = %e, "Filter unavailable, failing open");
                    return true;
                }
            }
        }
        true
    }
}

impl std::fmt::Debug for ExistenceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExistenceFilter")
            .field("keyspace", &self.keyspace)
            .field("sizing", &self.sizing)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKvStore;
    use crate::error::Error;

    const KEY: &str = "bloom:shop";

    fn filter(store: Arc<InMemoryKvStore>) -> ExistenceFilter {
        ExistenceFilter::with_defaults(store)
    }

    #[tokio::test]
    async fn test_empty_filter_rejects() {
        let filter = filter(Arc::new(InMemoryKvStore::new()));
        assert!(!filter.might_contain(KEY, "never-added-42").await);
    }

    #[tokio::test]
    async fn test_add_then_contains() {
        let store = Arc::new(InMemoryKvStore::new());
        let filter = filter(store.clone());

        filter.add(KEY, "1").await.unwrap();
        assert!(filter.might_contain(KEY, "1").await);
        assert!(store.bit_count(KEY) <= 3);
        assert!(store.bit_count(KEY) >= 1);
    }

    #[tokio::test]
    async fn test_offsets_are_deterministic_and_in_range() {
        let sizing = FilterSizing::new(1000, 5).unwrap();
        let filter = ExistenceFilter::new(
            Arc::new(InMemoryKvStore::new()),
            Keyspace::default(),
            sizing,
        );
        let a = filter.bit_offsets("shop-17");
        let b = filter.bit_offsets("shop-17");
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.iter().all(|&o| o < 1000));
    }

    #[test]
    fn test_single_bit_width_maps_everything_to_zero() {
        let sizing = FilterSizing::new(1, 3).unwrap();
        let filter = ExistenceFilter::new(
            Arc::new(InMemoryKvStore::new()),
            Keyspace::default(),
            sizing,
        );
        assert_eq!(filter.bit_offsets("anything"), vec![0, 0, 0]);
        assert_eq!(filter.sizing().bit_width(), 1);
    }

    #[tokio::test]
    async fn test_hash_functions_are_distinct() {
        let filter = filter(Arc::new(InMemoryKvStore::new()));
        let offsets = filter.bit_offsets("42");
        assert_ne!(offsets[0], offsets[1]);
        assert_ne!(offsets[1], offsets[2]);
    }

    #[tokio::test]
    async fn test_add_batch_counts() {
        let filter = filter(Arc::new(InMemoryKvStore::new()));
        let ids: Vec<String> = (1..=50).map(|i| i.to_string()).collect();
        assert_eq!(filter.add_batch(KEY, &ids).await.unwrap(), 50);
        for id in &ids {
            assert!(filter.might_contain(KEY, id).await);
        }
    }

    #[tokio::test]
    async fn test_fail_open_when_store_offline() {
        let store = Arc::new(InMemoryKvStore::new());
        let filter = filter(store.clone());
        store.set_offline(true);

        assert!(filter.might_contain(KEY, "anything").await);
        assert_eq!(filter.degraded_checks(), 1);
        assert!(matches!(
            filter.add(KEY, "1").await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = Arc::new(InMemoryKvStore::new());
        let a = ExistenceFilter::new(store.clone(), Keyspace::namespaced("a"), FilterSizing::default());
        let b = ExistenceFilter::new(store.clone(), Keyspace::namespaced("b"), FilterSizing::default());

        a.add(KEY, "7").await.unwrap();
        assert!(a.might_contain(KEY, "7").await);
        assert!(!b.might_contain(KEY, "7").await);
    }
}
