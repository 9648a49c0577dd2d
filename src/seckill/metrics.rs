//! Admission counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::rejection::Rejection;

/// Admission metrics collector
#[derive(Debug, Default)]
pub struct AdmissionMetrics {
    attempts: AtomicU64,
    admitted: AtomicU64,
    errors: AtomicU64,
    rejections: [AtomicU64; Rejection::COUNT],
}

impl AdmissionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, reason: Rejection) {
        self.rejections[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn rejections_of(&self, reason: Rejection) -> u64 {
        self.rejections[reason.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> AdmissionMetricsSnapshot {
        AdmissionMetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            admitted: self.admitted(),
            errors: self.errors.load(Ordering::Relaxed),
            rejections: Rejection::ALL
                .iter()
                .map(|r| (r.as_str(), self.rejections_of(*r)))
                .collect(),
        }
    }
}

/// Snapshot of admission metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionMetricsSnapshot {
    pub attempts: u64,
    pub admitted: u64,
    pub errors: u64,
    /// Rejection count by reason label
    pub rejections: BTreeMap<&'static str, u64>,
}

impl AdmissionMetricsSnapshot {
    pub fn total_rejected(&self) -> u64 {
        self.rejections.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let metrics = AdmissionMetrics::new();
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_admitted();
        metrics.record_rejection(Rejection::OutOfStock);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.admitted, 1);
        assert_eq!(snapshot.rejections["out_of_stock"], 1);
        assert_eq!(snapshot.rejections["ended"], 0);
        assert_eq!(snapshot.total_rejected(), 1);
    }
}
