//! Cached category list.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{GuardConfig, Keyspace, CACHE_SHOP_TYPE_KEY};
use crate::domain::model::ShopType;
use crate::domain::ports::{KvStore, ShopTypeRepository};
use crate::error::Result;

/// Serves the category list from one cached JSON array.
pub struct ShopTypeService {
    store: Arc<dyn KvStore>,
    repo: Arc<dyn ShopTypeRepository>,
    keyspace: Keyspace,
    ttl: Duration,
}

impl ShopTypeService {
    pub fn new(store: Arc<dyn KvStore>, repo: Arc<dyn ShopTypeRepository>, config: &GuardConfig) -> Self {
        Self {
            store,
            repo,
            keyspace: config.keyspace.clone(),
            ttl: config.cache.shop_type_ttl(),
        }
    }

    /// Categories in ascending display order.
    pub async fn list(&self) -> Result<Vec<ShopType>> {
        let key = self.keyspace.key(CACHE_SHOP_TYPE_KEY);

        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<ShopType>>(&raw) {
                Ok(types) => {
                    debug!(key = %key, count = types.len(), "Category list cache hit");
                    return Ok(types);
                }
                Err(e) => warn!(key = %key, error = %e, "Cached category list undecodable"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Category list cache unavailable"),
        }

        let types = self.repo.list_by_sort().await?;
        if types.is_empty() {
            // Nothing worth caching; the next call scans again.
            return Ok(types);
        }
        let payload = serde_json::to_string(&types)?;
        if let Err(e) = self.store.set(&key, &payload, Some(self.ttl)).await {
            warn!(key = %key, error = %e, "Failed to cache category list");
        }
        Ok(types)
    }
}

impl std::fmt::Debug for ShopTypeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopTypeService")
            .field("keyspace", &self.keyspace)
            .field("ttl", &self.ttl)
            .finish()
    }
}
