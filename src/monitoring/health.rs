//! Health Checks
//!
//! Readiness is driven by the shared store: without it the filter fails
//! open, the cache degrades to the database, and admissions fail.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::ports::KvStore;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatus {
    Healthy,
    /// Operational with reduced protection
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl HealthCheckResult {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: 0,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// Aggregated readiness report
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthReport {
    pub fn new(checks: Vec<HealthCheckResult>, uptime: Duration) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Probes the shared store with a cheap read.
pub struct StoreHealthCheck {
    store: Arc<dyn KvStore>,
    started: Instant,
}

impl StoreHealthCheck {
    const PROBE_KEY: &'static str = "health:probe";

    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            started: Instant::now(),
        }
    }

    pub async fn check(&self) -> HealthReport {
        let began = Instant::now();
        let result = match self.store.get(Self::PROBE_KEY).await {
            Ok(_) => HealthCheckResult::healthy("shared_store"),
            Err(e) => HealthCheckResult::unhealthy("shared_store", e.to_string()),
        };
        HealthReport::new(vec![result.with_duration(began.elapsed())], self.started.elapsed())
    }
}

impl std::fmt::Debug for StoreHealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHealthCheck").finish_non_exhaustive()
    }
}
