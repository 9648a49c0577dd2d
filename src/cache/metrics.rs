//! Cache Metrics Collection
//!
//! Lock-free counters for the read-through cache, sampled by the binary's
//! Prometheus endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Read outcomes
    hits: AtomicU64,
    stale_hits: AtomicU64,
    tombstone_hits: AtomicU64,
    filtered: AtomicU64,
    misses: AtomicU64,
    contended: AtomicU64,

    // Rebuild activity
    rebuilds: AtomicU64,
    background_rebuilds: AtomicU64,
    lock_waits: AtomicU64,
    tombstones_written: AtomicU64,

    // Failure handling
    degraded_reads: AtomicU64,
    write_back_failures: AtomicU64,

    invalidations: AtomicU64,

    // Rebuild latency (microseconds, exponential moving average)
    rebuild_latency_us: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_hit(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tombstone_hit(&self) {
        self.tombstone_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self, duration: Duration) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
        self.update_latency_ema(&self.rebuild_latency_us, duration);
    }

    pub fn record_background_rebuild(&self) {
        self.background_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tombstone_written(&self) {
        self.tombstones_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded_read(&self) {
        self.degraded_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_back_failure(&self) {
        self.write_back_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn rebuilds(&self) -> u64 {
        self.rebuilds.load(Ordering::Relaxed)
    }

    pub fn background_rebuilds(&self) -> u64 {
        self.background_rebuilds.load(Ordering::Relaxed)
    }

    fn update_latency_ema(&self, target: &AtomicU64, duration: Duration) {
        let new_us = duration.as_micros() as u64;
        let alpha = 0.1;

        loop {
            let current = target.load(Ordering::Relaxed);
            let updated = if current == 0 {
                new_us
            } else {
                ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
            };

            if target
                .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn rebuild_latency(&self) -> Duration {
        Duration::from_micros(self.rebuild_latency_us.load(Ordering::Relaxed))
    }

    /// Share of lookups answered from the cache, stale hits included.
    ///
    /// Filtered and tombstoned lookups count as answered; only misses that
    /// went to the record store count against the ratio.
    pub fn hit_ratio(&self) -> f64 {
        let answered = self.hits()
            + self.stale_hits.load(Ordering::Relaxed)
            + self.tombstone_hits.load(Ordering::Relaxed)
            + self.filtered.load(Ordering::Relaxed);
        let total = answered + self.misses();
        if total == 0 {
            0.0
        } else {
            answered as f64 / total as f64
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits(),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            tombstone_hits: self.tombstone_hits.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            misses: self.misses(),
            contended: self.contended.load(Ordering::Relaxed),
            rebuilds: self.rebuilds(),
            background_rebuilds: self.background_rebuilds(),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            tombstones_written: self.tombstones_written.load(Ordering::Relaxed),
            degraded_reads: self.degraded_reads.load(Ordering::Relaxed),
            write_back_failures: self.write_back_failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            rebuild_latency: self.rebuild_latency(),
            hit_ratio: self.hit_ratio(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.stale_hits,
            &self.tombstone_hits,
            &self.filtered,
            &self.misses,
            &self.contended,
            &self.rebuilds,
            &self.background_rebuilds,
            &self.lock_waits,
            &self.tombstones_written,
            &self.degraded_reads,
            &self.write_back_failures,
            &self.invalidations,
            &self.rebuild_latency_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub stale_hits: u64,
    pub tombstone_hits: u64,
    pub filtered: u64,
    pub misses: u64,
    pub contended: u64,
    pub rebuilds: u64,
    pub background_rebuilds: u64,
    pub lock_waits: u64,
    pub tombstones_written: u64,
    pub degraded_reads: u64,
    pub write_back_failures: u64,
    pub invalidations: u64,
    pub rebuild_latency: Duration,
    pub hit_ratio: f64,
}

// =============================================================================
// Tests
// =============================================================================
