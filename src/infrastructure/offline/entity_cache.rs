use crate::infrastructure::database::local_store::LocalStore;
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// Local mirror of one remote collection. Each row is an envelope
/// `{ id, payload, cached_at }`; the payload is the remote record verbatim.
/// The mirror is a cache, never authoritative while the remote is reachable.
pub struct EntityCache {
    store: Arc<LocalStore>,
    partition: String,
    /// Field of the raw record the mirror key is taken from.
    key_field: String,
}

impl EntityCache {
    pub fn new(store: Arc<LocalStore>, partition: &str, key_field: &str) -> Self {
        Self {
            store,
            partition: partition.to_string(),
            key_field: key_field.to_string(),
        }
    }

    /// Atomically replaces the whole mirror with the given records. An empty
    /// slice empties the mirror: a successful empty remote read means the
    /// collection really is empty.
    pub async fn refresh_all(&self, records: &[Value]) -> Result<(), AppError> {
        let now = Utc::now().timestamp();
        let entries = records
            .iter()
            .map(|record| self.envelope(record, now))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.replace_all(&self.partition, &entries).await
    }

    /// Upsert of a single record, refreshing its `cached_at`.
    pub async fn upsert(&self, record: &Value) -> Result<(), AppError> {
        let (key, envelope) = self.envelope(record, Utc::now().timestamp())?;
        self.store
            .put(&self.partition, &envelope, Some(&key))
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Value>, AppError> {
        let row = self.store.get(&self.partition, id).await?;
        Ok(row.and_then(unwrap_payload))
    }

    pub async fn get_all(&self) -> Result<Vec<Value>, AppError> {
        let rows = self.store.get_all(&self.partition).await?;
        Ok(rows.into_iter().filter_map(unwrap_payload).collect())
    }

    pub async fn get_by_index(&self, index: &str, keys: &[Value]) -> Result<Vec<Value>, AppError> {
        let rows = self
            .store
            .get_all_by_index(&self.partition, index, keys)
            .await?;
        Ok(rows.into_iter().filter_map(unwrap_payload).collect())
    }

    pub async fn remove(&self, id: &str) -> Result<(), AppError> {
        self.store.delete(&self.partition, id).await
    }

    /// Explicit maintenance sweep: removes entries cached longer ago than
    /// `max_age_secs` and reports how many were removed. Never runs on a
    /// timer.
    pub async fn evict_older_than(&self, max_age_secs: i64) -> Result<u64, AppError> {
        let cutoff = Utc::now().timestamp() - max_age_secs;
        self.store
            .delete_where_older(&self.partition, "cached_at", cutoff)
            .await
    }

    pub async fn len(&self) -> Result<i64, AppError> {
        self.store.count(&self.partition).await
    }

    fn envelope(&self, record: &Value, cached_at: i64) -> Result<(String, Value), AppError> {
        let key = record
            .get(&self.key_field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "record has no string field `{}` to mirror by",
                    self.key_field
                ))
            })?
            .to_string();
        let envelope = json!({
            "id": key,
            "payload": record,
            "cached_at": cached_at,
        });
        Ok((key, envelope))
    }
}

fn unwrap_payload(envelope: Value) -> Option<Value> {
    match envelope {
        Value::Object(mut map) => map.remove("payload"),
        _ => None,
    }
}
