//! Cache Rebuild Policy - Protected Read-Through Cache
//!
//! Serves records from the shared store and repopulates them from the record
//! store on a miss, without letting a hot key's expiry turn into a stampede
//! on the database.

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::entry::{self, CachedValue, TOMBSTONE};
use super::metrics::CacheMetrics;
use super::outcome::{AbsentReason, LookupOutcome};
use super::strategy::RebuildStrategy;
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheSettings, Keyspace};
use crate::domain::events::DomainEvent;
use crate::domain::ports::{EventPublisher, KvStore, RecordSource};
use crate::error::{Error, Result};
use crate::filter::ExistenceFilter;
use crate::lock::{DistributedLock, HeldLock};

/// What the shared store held for a key.
enum CacheRead<T> {
    Miss,
    Value(CachedValue<T>),
    /// Store error or undecodable payload
    Unreadable,
}

/// Read-through cache for one record type.
///
/// Cloning is cheap; clones share the store, lock factory, metrics, and the
/// background task tracker.
pub struct CacheRebuildPolicy<K, T> {
    store: Arc<dyn KvStore>,
    locks: Arc<DistributedLock>,
    source: Arc<dyn RecordSource<K, T>>,
    filter: Option<(Arc<ExistenceFilter>, String)>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<dyn EventPublisher>>,
    metrics: Arc<CacheMetrics>,
    settings: CacheSettings,
    keyspace: Keyspace,
    cache_prefix: String,
    lock_prefix: Option<String>,
    background: TaskTracker,
    _record: PhantomData<fn() -> T>,
}

impl<K, T> Clone for CacheRebuildPolicy<K, T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            locks: self.locks.clone(),
            source: self.source.clone(),
            filter: self.filter.clone(),
            clock: self.clock.clone(),
            events: self.events.clone(),
            metrics: self.metrics.clone(),
            settings: self.settings.clone(),
            keyspace: self.keyspace.clone(),
            cache_prefix: self.cache_prefix.clone(),
            lock_prefix: self.lock_prefix.clone(),
            background: self.background.clone(),
            _record: PhantomData,
        }
    }
}

impl<K, T> std::fmt::Debug for CacheRebuildPolicy<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRebuildPolicy")
            .field("strategy", &self.settings.strategy)
            .field("cache_prefix", &self.cache_prefix)
            .field("lock_prefix", &self.lock_prefix)
            .field("filter", &self.filter.as_ref().map(|(_, key)| key))
            .field("keyspace", &self.keyspace)
            .finish()
    }
}

impl<K, T> CacheRebuildPolicy<K, T>
where
    K: Display + Clone + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a policy caching records under `cache_prefix`.
    ///
    /// Without [`with_filter`](Self::with_filter) every ID goes to the cache.
    pub fn new(
        store: Arc<dyn KvStore>,
        locks: Arc<DistributedLock>,
        source: Arc<dyn RecordSource<K, T>>,
        settings: CacheSettings,
        cache_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            locks,
            source,
            filter: None,
            clock: Arc::new(SystemClock),
            events: None,
            metrics: Arc::new(CacheMetrics::new()),
            settings,
            keyspace: Keyspace::default(),
            cache_prefix: cache_prefix.into(),
            lock_prefix: None,
            background: TaskTracker::new(),
            _record: PhantomData,
        }
    }

    /// Short-circuit IDs the filter has never seen.
    pub fn with_filter(mut self, filter: Arc<ExistenceFilter>, filter_key: impl Into<String>) -> Self {
        self.filter = Some((filter, filter_key.into()));
        self
    }

    /// Lock resources become `<prefix><id>` instead of the raw cache key.
    pub fn with_lock_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_prefix = Some(prefix.into());
        self
    }

    /// Namespace applied to cache and lock keys.
    pub fn with_keyspace(mut self, keyspace: Keyspace) -> Self {
        self.keyspace = keyspace;
        self
    }

    /// Clock used for logical expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish rebuild and invalidation events.
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Share a metrics sink with other components.
    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn strategy(&self) -> RebuildStrategy {
        self.settings.strategy
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Shared-store key holding the entry for `id`.
    pub fn cache_key(&self, id: &K) -> String {
        self.keyspace.cache_key(&self.cache_prefix, &id.to_string())
    }

    fn lock_resource(&self, raw_id: &str) -> String {
        match &self.lock_prefix {
            Some(prefix) => format!("{}{}", prefix, raw_id),
            None => format!("{}{}", self.cache_prefix, raw_id),
        }
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Look up a record with penetration and breakdown protection.
    ///
    /// Only record store failures on a rebuild surface as errors; shared
    /// store failures degrade to a direct load.
    pub async fn lookup_with_protection(&self, id: &K) -> Result<LookupOutcome<T>> {
        let raw_id = id.to_string();

        if let Some((filter, filter_key)) = &self.filter {
            if !filter.might_contain(filter_key, &raw_id).await {
                self.metrics.record_filtered();
                return Ok(LookupOutcome::Absent(AbsentReason::Filtered));
            }
        }

        let key = self.keyspace.cache_key(&self.cache_prefix, &raw_id);
        match self.settings.strategy {
            RebuildStrategy::PassThrough => self.lookup_pass_through(id, &key).await,
            RebuildStrategy::Mutex | RebuildStrategy::LogicalExpiration => {
                self.lookup_serialized(id, &raw_id, &key).await
            }
        }
    }

    async fn lookup_pass_through(&self, id: &K, key: &str) -> Result<LookupOutcome<T>> {
        match self.read_cached(key).await {
            CacheRead::Value(value) => return Ok(self.answer_cached(id, key, value).await),
            CacheRead::Unreadable => return self.degraded_load(id, key).await,
            CacheRead::Miss => {}
        }
        self.metrics.record_miss();
        self.load_and_fill(id, key, false).await
    }

    async fn lookup_serialized(&self, id: &K, raw_id: &str, key: &str) -> Result<LookupOutcome<T>> {
        let resource = self.lock_resource(raw_id);
        let retries = self.settings.max_retries;

        // One read and one lock attempt always happen; `max_retries` bounds the waits.
        for attempt in 0..=retries {
            match self.read_cached(key).await {
                CacheRead::Value(value) => return Ok(self.answer_cached(id, key, value).await),
                CacheRead::Unreadable => return self.degraded_load(id, key).await,
                CacheRead::Miss => {}
            }

            match self
                .locks
                .try_lock(&resource, self.settings.rebuild_lock_ttl())
                .await
            {
                Ok(Some(held)) => {
                    let outcome = self.rebuild_under_lock(id, key).await;
                    release(held).await;
                    return outcome;
                }
                Ok(None) if attempt < retries => {
                    self.metrics.record_lock_wait();
                    debug!(key = %key, attempt, "Rebuild in progress elsewhere, waiting");
                    tokio::time::sleep(self.settings.retry_interval()).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Rebuild lock unavailable, loading directly");
                    return self.degraded_load(id, key).await;
                }
            }
        }

        self.metrics.record_contended();
        warn!(key = %key, retries, "Gave up waiting for cache rebuild");
        Ok(LookupOutcome::Absent(AbsentReason::Contended))
    }

    async fn rebuild_under_lock(&self, id: &K, key: &str) -> Result<LookupOutcome<T>> {
        // The previous holder may have filled the entry between our miss and our grant.
        if let CacheRead::Value(value) = self.read_cached(key).await {
            return Ok(self.answer_cached(id, key, value).await);
        }
        self.metrics.record_miss();
        self.load_and_fill(id, key, false).await
    }

    async fn answer_cached(&self, id: &K, key: &str, value: CachedValue<T>) -> LookupOutcome<T> {
        match value {
            CachedValue::Fresh(record) => {
                self.metrics.record_hit();
                debug!(key = %key, "Cache hit");
                LookupOutcome::Hit(record)
            }
            CachedValue::Tombstone => {
                self.metrics.record_tombstone_hit();
                debug!(key = %key, "Cache tombstone hit");
                LookupOutcome::Absent(AbsentReason::Tombstone)
            }
            CachedValue::Stale(record) => {
                self.metrics.record_stale_hit();
                debug!(key = %key, "Serving logically expired entry");
                self.refresh_in_background(id, key).await;
                LookupOutcome::Hit(record)
            }
        }
    }

    async fn read_cached(&self, key: &str) -> CacheRead<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheRead::Miss,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                return CacheRead::Unreadable;
            }
        };
        match entry::decode(&raw, self.settings.strategy.uses_envelope(), self.clock.now()) {
            Ok(value) => CacheRead::Value(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached payload undecodable");
                CacheRead::Unreadable
            }
        }
    }

    /// Bypass the cache after a read failure, then try to repair the entry.
    async fn degraded_load(&self, id: &K, key: &str) -> Result<LookupOutcome<T>> {
        self.metrics.record_degraded_read();
        let record = self.source.load(id).await?;
        self.write_back(key, record.as_ref()).await;
        Ok(match record {
            Some(record) => LookupOutcome::Hit(record),
            None => LookupOutcome::Absent(AbsentReason::NotInStore),
        })
    }

    async fn load_and_fill(&self, id: &K, key: &str, background: bool) -> Result<LookupOutcome<T>> {
        let started = Instant::now();
        let record = self.source.load(id).await?;
        let found = record.is_some();
        self.write_back(key, record.as_ref()).await;

        let elapsed = started.elapsed();
        self.metrics.record_rebuild(elapsed);
        info!(
            key = %key,
            found,
            background,
            elapsed_ms = elapsed.as_millis() as u64,
            "Cache entry rebuilt"
        );
        self.publish(DomainEvent::cache_rebuilt(key, found, background, elapsed))
            .await;

        Ok(match record {
            Some(record) => LookupOutcome::Hit(record),
            None => LookupOutcome::Absent(AbsentReason::NotInStore),
        })
    }

    // =========================================================================
    // Background refresh (logical expiration)
    // =========================================================================

    async fn refresh_in_background(&self, id: &K, key: &str) {
        let resource = self.lock_resource(&id.to_string());
        let held = match self
            .locks
            .try_lock(&resource, self.settings.rebuild_lock_ttl())
            .await
        {
            Ok(Some(held)) => held,
            Ok(None) => {
                debug!(key = %key, "Refresh already running elsewhere");
                return;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Refresh lock unavailable, keeping stale entry");
                return;
            }
        };

        self.metrics.record_background_rebuild();
        let this = self.clone();
        let id = id.clone();
        let key = key.to_string();
        self.background.spawn(async move {
            if let CacheRead::Value(CachedValue::Fresh(_)) = this.read_cached(&key).await {
                debug!(key = %key, "Entry refreshed before the task ran");
            } else if let Err(e) = this.load_and_fill(&id, &key, true).await {
                warn!(key = %key, error = %e, "Background rebuild failed, stale entry kept");
            }
            release(held).await;
        });
    }

    /// Wait for every background refresh spawned so far.
    pub async fn wait_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Drop the cached entry for `id`. The next read repopulates it.
    pub async fn invalidate(&self, id: &K) -> Result<()> {
        let key = self.cache_key(id);
        let existed = self.store.delete(&key).await?;
        self.metrics.record_invalidation();
        debug!(key = %key, existed, "Cache entry invalidated");
        self.publish(DomainEvent::cache_invalidated(key)).await;
        Ok(())
    }

    /// Pre-load `id` into a logical-expiry envelope valid for `logical_ttl`.
    ///
    /// Returns false when the record store has no such record.
    pub async fn warm_up(&self, id: &K, logical_ttl: Duration) -> Result<bool> {
        if !self.settings.strategy.uses_envelope() {
            return Err(Error::InvalidArgument(format!(
                "warm_up needs the logical_expiration strategy, policy uses {}",
                self.settings.strategy
            )));
        }

        let key = self.cache_key(id);
        let Some(record) = self.source.load(id).await? else {
            debug!(key = %key, "Nothing to warm up");
            return Ok(false);
        };
        let expire_at = self.clock.now() + to_chrono(logical_ttl);
        let payload = entry::encode_envelope(&record, expire_at)?;
        self.store.set(&key, &payload, None).await?;
        info!(key = %key, expire_at = %expire_at, "Cache entry warmed up");
        Ok(true)
    }

    async fn write_entry(&self, key: &str, record: Option<&T>) -> Result<()> {
        match record {
            Some(record) if self.settings.strategy.uses_envelope() => {
                let expire_at = self.clock.now() + to_chrono(self.settings.logical_ttl());
                let payload = entry::encode_envelope(record, expire_at)?;
                self.store.set(key, &payload, None).await
            }
            Some(record) => {
                let payload = entry::encode_plain(record)?;
                self.store.set(key, &payload, Some(self.settings.ttl())).await
            }
            None => {
                self.store
                    .set(key, TOMBSTONE, Some(self.settings.tombstone_ttl()))
                    .await?;
                self.metrics.record_tombstone_written();
                Ok(())
            }
        }
    }

    async fn write_back(&self, key: &str, record: Option<&T>) {
        if let Err(e) = self.write_entry(key, record).await {
            self.metrics.record_write_back_failure();
            warn!(key = %key, error = %e, "Cache write-back failed");
        }
    }

    async fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event).await {
                warn!(error = %e, "Failed to publish cache event");
            }
        }
    }
}

async fn release(held: HeldLock) {
    let key = held.key().to_string();
    if let Err(e) = held.unlock().await {
        warn!(lock = %key, error = %e, "Failed to release rebuild lock");
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis().min(i64::MAX as u128) as i64)
}

// =============================================================================
// Tests
// =============================================================================
