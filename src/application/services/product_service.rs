use crate::application::ports::remote_backend::{RemoteBackend, RemoteError};
use crate::domain::entities::Product;
use crate::domain::value_objects::{EventCategory, GenderCategory};
use crate::infrastructure::database::schema::{
    IDX_BY_EVENT, IDX_BY_GENDER, IDX_BY_GENDER_EVENT, PREFERENCES,
};
use crate::infrastructure::database::LocalStore;
use crate::infrastructure::offline::EntityCache;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const COLLECTION: &str = "products";
const LAST_SYNC_KEY: &str = "products_last_sync";

/// Read interface over "remote if reachable, local mirror otherwise".
/// A successful remote read refreshes the mirror; a failed one falls back
/// to whatever the mirror holds, stale or empty. Callers tolerate staleness.
pub struct ProductService {
    backend: Arc<dyn RemoteBackend>,
    cache: Arc<EntityCache>,
    store: Arc<LocalStore>,
}

impl ProductService {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        cache: Arc<EntityCache>,
        store: Arc<LocalStore>,
    ) -> Self {
        Self {
            backend,
            cache,
            store,
        }
    }

    pub async fn get_all(&self) -> Result<Vec<Product>, AppError> {
        let filters = [("is_available".to_string(), json!(true))];
        match self.backend.fetch_all(COLLECTION, &filters).await {
            Ok(records) => {
                // リモート成功はミラーを丸ごと置き換える。空の成功も空として反映する。
                if let Err(e) = self.cache.refresh_all(&records).await {
                    warn!(error = %e, "product mirror refresh failed, keeping remote result");
                }
                self.record_last_sync().await;
                Ok(parse_products(records))
            }
            Err(e) => {
                warn!(error = %e, "remote product fetch failed, serving offline mirror");
                Ok(parse_products(self.cache.get_all().await?))
            }
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Product>, AppError> {
        match self.backend.fetch_by_id(COLLECTION, id).await {
            Ok(record) => {
                if let Err(e) = self.cache.upsert(&record).await {
                    warn!(error = %e, "product mirror upsert failed");
                }
                Ok(parse_product(record))
            }
            // 確定的な「存在しない」はミラーへフォールバックしない
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => {
                warn!(id, error = %e, "remote product fetch failed, serving offline mirror");
                Ok(self.cache.get(id).await?.and_then(parse_product))
            }
        }
    }

    pub async fn get_by_gender(&self, gender: GenderCategory) -> Result<Vec<Product>, AppError> {
        self.filtered_fetch(
            vec![("gender".to_string(), json!(gender.as_str()))],
            IDX_BY_GENDER,
            vec![json!(gender.as_str())],
        )
        .await
    }

    pub async fn get_by_event(&self, event: EventCategory) -> Result<Vec<Product>, AppError> {
        self.filtered_fetch(
            vec![("event_category".to_string(), json!(event.as_str()))],
            IDX_BY_EVENT,
            vec![json!(event.as_str())],
        )
        .await
    }

    pub async fn get_by_gender_and_event(
        &self,
        gender: GenderCategory,
        event: EventCategory,
    ) -> Result<Vec<Product>, AppError> {
        self.filtered_fetch(
            vec![
                ("gender".to_string(), json!(gender.as_str())),
                ("event_category".to_string(), json!(event.as_str())),
            ],
            IDX_BY_GENDER_EVENT,
            vec![json!(gender.as_str()), json!(event.as_str())],
        )
        .await
    }

    async fn filtered_fetch(
        &self,
        mut filters: Vec<(String, Value)>,
        index: &str,
        index_keys: Vec<Value>,
    ) -> Result<Vec<Product>, AppError> {
        filters.push(("is_available".to_string(), json!(true)));
        match self.backend.fetch_all(COLLECTION, &filters).await {
            Ok(records) => Ok(parse_products(records)),
            Err(e) => {
                warn!(index, error = %e, "remote filtered fetch failed, using secondary index");
                Ok(parse_products(
                    self.cache.get_by_index(index, &index_keys).await?,
                ))
            }
        }
    }

    pub async fn search(
        &self,
        query: &str,
        gender: Option<GenderCategory>,
        event: Option<EventCategory>,
    ) -> Result<Vec<Product>, AppError> {
        let products = match (gender, event) {
            (Some(g), Some(e)) => self.get_by_gender_and_event(g, e).await?,
            (Some(g), None) => self.get_by_gender(g).await?,
            (None, Some(e)) => self.get_by_event(e).await?,
            (None, None) => self.get_all().await?,
        };

        let needle = query.to_lowercase();
        Ok(products
            .into_iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&needle)
                    || p.description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
                    || p.color.to_lowercase().contains(&needle)
            })
            .collect())
    }

    pub async fn featured(&self, limit: usize) -> Result<Vec<Product>, AppError> {
        let mut products = self.get_all().await?;
        products.sort_by(|a, b| b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal));
        products.truncate(limit);
        Ok(products)
    }

    /// Local-only write-through to the mirror. A remote write plus a queue
    /// entry is the caller's responsibility when offline safety is needed.
    pub async fn put(&self, product: &Product) -> Result<(), AppError> {
        self.cache.upsert(&serde_json::to_value(product)?).await
    }

    pub async fn without_sops(&self) -> Result<Vec<Product>, AppError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|p| p.hygiene_sop_id.is_none())
            .collect())
    }

    /// Explicit maintenance sweep over the mirror.
    pub async fn evict_older_than(&self, max_age_secs: i64) -> Result<u64, AppError> {
        self.cache.evict_older_than(max_age_secs).await
    }

    pub async fn last_sync(&self) -> Option<i64> {
        match self.store.get(PREFERENCES, LAST_SYNC_KEY).await {
            Ok(value) => value.and_then(|v| v.as_i64()),
            Err(_) => None,
        }
    }

    async fn record_last_sync(&self) {
        // キャッシュ系の書き込みはベストエフォート
        if let Err(e) = self
            .store
            .put(PREFERENCES, &json!(Utc::now().timestamp()), Some(LAST_SYNC_KEY))
            .await
        {
            debug!(error = %e, "could not record last sync time");
        }
    }
}

fn parse_product(record: Value) -> Option<Product> {
    match serde_json::from_value::<Product>(record) {
        Ok(product) => Some(product),
        Err(e) => {
            // 形の崩れたレコードはそのレコードだけ捨てる
            warn!(error = %e, "skipping malformed product record");
            None
        }
    }
}

fn parse_products(records: Vec<Value>) -> Vec<Product> {
    records.into_iter().filter_map(parse_product).collect()
}
