//! Observability
//!
//! ```text
//!  CacheMetrics ──┐
//!  AdmissionMetrics ─┼──▶ MetricsExporter ──▶ GET /metrics (text format)
//!  ExistenceFilter ──┘
//!
//!  KvStore ──────────▶ StoreHealthCheck ──▶ GET /readyz (JSON)
//! ```

mod exporter;
mod health;

pub use exporter::MetricsExporter;
pub use health::{HealthCheckResult, HealthReport, HealthStatus, StoreHealthCheck};
