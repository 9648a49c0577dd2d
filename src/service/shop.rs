//! Shop query and update service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::cache::{CacheMetrics, CacheRebuildPolicy, LookupOutcome};
use crate::clock::Clock;
use crate::config::{GuardConfig, CACHE_SHOP_PREFIX, FILTER_SHOP_KEY, REBUILD_RESOURCE_PREFIX};
use crate::domain::model::{Shop, ShopId};
use crate::domain::ports::{EventPublisher, KvStore, RecordSource, ShopRepository};
use crate::error::{Error, Result};
use crate::filter::ExistenceFilter;
use crate::lock::DistributedLock;

/// [`RecordSource`] view over a shop repository.
pub struct ShopRecords(pub Arc<dyn ShopRepository>);

#[async_trait]
impl RecordSource<ShopId, Shop> for ShopRecords {
    async fn load(&self, id: &ShopId) -> Result<Option<Shop>> {
        self.0.find_by_id(*id).await
    }
}

/// Shop reads go through the protected cache; writes go to the repository
/// first and then drop the cached entry.
pub struct ShopService {
    repo: Arc<dyn ShopRepository>,
    cache: CacheRebuildPolicy<ShopId, Shop>,
    filter: Arc<ExistenceFilter>,
}

impl ShopService {
    pub fn new(
        repo: Arc<dyn ShopRepository>,
        store: Arc<dyn KvStore>,
        locks: Arc<DistributedLock>,
        filter: Arc<ExistenceFilter>,
        config: &GuardConfig,
    ) -> Self {
        let cache = CacheRebuildPolicy::new(
            store,
            locks,
            Arc::new(ShopRecords(repo.clone())),
            config.cache.clone(),
            CACHE_SHOP_PREFIX,
        )
        .with_keyspace(config.keyspace.clone())
        .with_lock_prefix(REBUILD_RESOURCE_PREFIX)
        .with_filter(filter.clone(), FILTER_SHOP_KEY);

        Self {
            repo,
            cache,
            filter,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.cache = self.cache.with_clock(clock);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.cache = self.cache.with_events(events);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.cache = self.cache.with_metrics(metrics);
        self
    }

    pub fn cache(&self) -> &CacheRebuildPolicy<ShopId, Shop> {
        &self.cache
    }

    pub async fn query_by_id(&self, id: ShopId) -> Result<LookupOutcome<Shop>> {
        self.cache.lookup_with_protection(&id).await
    }

    /// Persist a change, then invalidate the cached copy.
    pub async fn update(&self, shop: &Shop) -> Result<()> {
        if !self.repo.update(shop).await? {
            return Err(Error::InvalidArgument(format!("shop {} does not exist", shop.id)));
        }
        self.cache.invalidate(&shop.id).await?;
        info!(shop = %shop.id, "Shop updated");
        Ok(())
    }

    /// Insert a shop and register it with the existence filter.
    pub async fn create(&self, shop: Shop) -> Result<ShopId> {
        let id = shop.id;
        self.repo.insert(shop).await?;
        self.filter.add(FILTER_SHOP_KEY, &id.to_string()).await?;
        info!(shop = %id, "Shop created");
        Ok(id)
    }
}

impl std::fmt::Debug for ShopService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopService")
            .field("cache", &self.cache)
            .finish()
    }
}
