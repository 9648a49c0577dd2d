//! Prometheus text exposition of the guard's counters.

use std::sync::Arc;

use prometheus::{Encoder, Gauge, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::CacheMetrics;
use crate::error::{Error, Result};
use crate::filter::ExistenceFilter;
use crate::seckill::AdmissionMetrics;

fn prom(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

/// Samples the component metrics into a private registry on every scrape.
pub struct MetricsExporter {
    registry: Registry,
    cache: Arc<CacheMetrics>,
    admission: Arc<AdmissionMetrics>,
    filter: Option<Arc<ExistenceFilter>>,

    cache_lookups: IntGaugeVec,
    cache_activity: IntGaugeVec,
    cache_hit_ratio: Gauge,
    cache_rebuild_seconds: Gauge,
    admissions: IntGaugeVec,
    rejections: IntGaugeVec,
    filter_degraded: IntGauge,
}

impl MetricsExporter {
    pub fn new(cache: Arc<CacheMetrics>, admission: Arc<AdmissionMetrics>) -> Result<Self> {
        let registry = Registry::new_custom(Some("shopguard".to_string()), None).map_err(prom)?;

        let cache_lookups = IntGaugeVec::new(
            Opts::new("cache_lookups", "Protected lookups by outcome"),
            &["outcome"],
        )
        .map_err(prom)?;
        let cache_activity = IntGaugeVec::new(
            Opts::new("cache_activity", "Cache rebuild and maintenance activity"),
            &["kind"],
        )
        .map_err(prom)?;
        let cache_hit_ratio =
            Gauge::new("cache_hit_ratio", "Share of lookups answered without the record store")
                .map_err(prom)?;
        let cache_rebuild_seconds = Gauge::new(
            "cache_rebuild_seconds",
            "Moving average of cache rebuild latency",
        )
        .map_err(prom)?;
        let admissions = IntGaugeVec::new(
            Opts::new("seckill_admissions", "Seckill admission attempts by result"),
            &["result"],
        )
        .map_err(prom)?;
        let rejections = IntGaugeVec::new(
            Opts::new("seckill_rejections", "Seckill rejections by reason"),
            &["reason"],
        )
        .map_err(prom)?;
        let filter_degraded = IntGauge::new(
            "filter_degraded_checks",
            "Filter checks answered open because the store was unavailable",
        )
        .map_err(prom)?;

        registry.register(Box::new(cache_lookups.clone())).map_err(prom)?;
        registry.register(Box::new(cache_activity.clone())).map_err(prom)?;
        registry.register(Box::new(cache_hit_ratio.clone())).map_err(prom)?;
        registry.register(Box::new(cache_rebuild_seconds.clone())).map_err(prom)?;
        registry.register(Box::new(admissions.clone())).map_err(prom)?;
        registry.register(Box::new(rejections.clone())).map_err(prom)?;
        registry.register(Box::new(filter_degraded.clone())).map_err(prom)?;

        Ok(Self {
            registry,
            cache,
            admission,
            filter: None,
            cache_lookups,
            cache_activity,
            cache_hit_ratio,
            cache_rebuild_seconds,
            admissions,
            rejections,
            filter_degraded,
        })
    }

    pub fn with_filter(mut self, filter: Arc<ExistenceFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Copy the current counter values into the registry.
    pub fn refresh(&self) {
        let cache = self.cache.snapshot();
        for (outcome, value) in [
            ("hit", cache.hits),
            ("stale_hit", cache.stale_hits),
            ("tombstone", cache.tombstone_hits),
            ("filtered", cache.filtered),
            ("miss", cache.misses),
            ("contended", cache.contended),
        ] {
            self.cache_lookups
                .with_label_values(&[outcome])
                .set(value as i64);
        }
        for (kind, value) in [
            ("rebuild", cache.rebuilds),
            ("background_rebuild", cache.background_rebuilds),
            ("lock_wait", cache.lock_waits),
            ("tombstone_written", cache.tombstones_written),
            ("degraded_read", cache.degraded_reads),
            ("write_back_failure", cache.write_back_failures),
            ("invalidation", cache.invalidations),
        ] {
            self.cache_activity.with_label_values(&[kind]).set(value as i64);
        }
        self.cache_hit_ratio.set(cache.hit_ratio);
        self.cache_rebuild_seconds
            .set(cache.rebuild_latency.as_secs_f64());

        let admission = self.admission.snapshot();
        for (result, value) in [
            ("attempt", admission.attempts),
            ("admitted", admission.admitted),
            ("error", admission.errors),
        ] {
            self.admissions.with_label_values(&[result]).set(value as i64);
        }
        for (reason, value) in &admission.rejections {
            self.rejections.with_label_values(&[*reason]).set(*value as i64);
        }

        if let Some(filter) = &self.filter {
            self.filter_degraded.set(filter.degraded_checks() as i64);
        }
    }

    /// Refresh and encode in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        self.refresh();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seckill::Rejection;

    #[test]
    fn test_render_reflects_snapshots() {
        let cache = Arc::new(CacheMetrics::new());
        let admission = Arc::new(AdmissionMetrics::new());
        let exporter = MetricsExporter::new(cache.clone(), admission.clone()).unwrap();

        cache.record_hit();
        cache.record_hit();
        cache.record_filtered();
        admission.record_attempt();
        admission.record_rejection(Rejection::OutOfStock);

        let text = exporter.render().unwrap();
        assert!(text.contains("shopguard_cache_lookups{outcome=\"hit\"} 2"));
        assert!(text.contains("shopguard_cache_lookups{outcome=\"filtered\"} 1"));
        assert!(text.contains("shopguard_seckill_rejections{reason=\"out_of_stock\"} 1"));
        assert!(text.contains("shopguard_seckill_admissions{result=\"attempt\"} 1"));

        cache.record_hit();
        let text = exporter.render().unwrap();
        assert!(text.contains("shopguard_cache_lookups{outcome=\"hit\"} 3"));
    }

    #[test]
    fn test_exporters_are_independent() {
        let a = MetricsExporter::new(Arc::new(CacheMetrics::new()), Arc::new(AdmissionMetrics::new()));
        let b = MetricsExporter::new(Arc::new(CacheMetrics::new()), Arc::new(AdmissionMetrics::new()));
        assert!(a.is_ok());
        assert!(b.is_ok());
    }
}
