//! Startup population of the shop existence filter.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::FILTER_SHOP_KEY;
use crate::domain::events::DomainEvent;
use crate::domain::ports::{EventPublisher, ShopRepository};
use crate::error::Result;
use crate::filter::ExistenceFilter;

/// Counts from one bootstrap run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub added: usize,
    pub failed: usize,
}

/// Loads every shop ID into the filter before traffic is served.
pub struct FilterBootstrap {
    repo: Arc<dyn ShopRepository>,
    filter: Arc<ExistenceFilter>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl FilterBootstrap {
    pub fn new(repo: Arc<dyn ShopRepository>, filter: Arc<ExistenceFilter>) -> Self {
        Self {
            repo,
            filter,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Enumerate all shop IDs and add them to `bloom:shop`.
    ///
    /// A failed `add` is logged and skipped; failing to enumerate is an error.
    pub async fn run(&self) -> Result<BootstrapReport> {
        let started = Instant::now();
        let ids = self.repo.all_ids().await?;
        if ids.is_empty() {
            warn!(filter = FILTER_SHOP_KEY, "No shops to load into the existence filter");
            return Ok(BootstrapReport::default());
        }

        let mut report = BootstrapReport::default();
        for id in &ids {
            match self.filter.add(FILTER_SHOP_KEY, &id.to_string()).await {
                Ok(()) => report.added += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(shop = %id, error = %e, "Failed to add shop to existence filter");
                }
            }
        }

        info!(
            filter = FILTER_SHOP_KEY,
            added = report.added,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Existence filter populated"
        );
        if let Some(events) = &self.events {
            if let Err(e) = events
                .publish(DomainEvent::filter_populated(FILTER_SHOP_KEY, report.added))
                .await
            {
                warn!(error = %e, "Failed to publish filter event");
            }
        }
        Ok(report)
    }
}
