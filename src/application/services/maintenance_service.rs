use crate::infrastructure::database::schema::{
    CART, OFFLINE_QUEUE, PREFERENCES, PRODUCTS, SOPS, WISHLIST,
};
use crate::infrastructure::database::LocalStore;
use crate::infrastructure::offline::{EntityCache, MutationQueue};
use crate::shared::config::StorageConfig;
use crate::shared::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    pub pruned_queue_entries: u64,
    pub evicted_products: u64,
    pub evicted_sops: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSizeReport {
    pub products: i64,
    pub cart: i64,
    pub wishlist: i64,
    pub queue: i64,
    pub sops: i64,
    pub preferences: i64,
}

/// Explicit maintenance pass over the local store: prune confirmed queue
/// entries and sweep over-age mirror rows. Invoked by the host application,
/// never on an implicit timer.
pub struct MaintenanceService {
    store: Arc<LocalStore>,
    queue: Arc<MutationQueue>,
    product_cache: Arc<EntityCache>,
    sop_cache: Arc<EntityCache>,
    max_age_secs: i64,
}

impl MaintenanceService {
    pub fn new(
        store: Arc<LocalStore>,
        queue: Arc<MutationQueue>,
        product_cache: Arc<EntityCache>,
        sop_cache: Arc<EntityCache>,
        config: &StorageConfig,
    ) -> Self {
        Self {
            store,
            queue,
            product_cache,
            sop_cache,
            max_age_secs: config.cache_max_age_secs,
        }
    }

    pub async fn optimize(&self) -> Result<MaintenanceReport, AppError> {
        let report = MaintenanceReport {
            pruned_queue_entries: self.queue.prune_synced().await?,
            evicted_products: self.product_cache.evict_older_than(self.max_age_secs).await?,
            evicted_sops: self.sop_cache.evict_older_than(self.max_age_secs).await?,
        };
        info!(
            pruned = report.pruned_queue_entries,
            products = report.evicted_products,
            sops = report.evicted_sops,
            "local store optimized"
        );
        Ok(report)
    }

    pub async fn cache_size(&self) -> Result<CacheSizeReport, AppError> {
        Ok(CacheSizeReport {
            products: self.store.count(PRODUCTS).await?,
            cart: self.store.count(CART).await?,
            wishlist: self.store.count(WISHLIST).await?,
            queue: self.store.count(OFFLINE_QUEUE).await?,
            sops: self.store.count(SOPS).await?,
            preferences: self.store.count(PREFERENCES).await?,
        })
    }
}
