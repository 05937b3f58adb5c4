use crate::domain::entities::{QueueEntry, QueuePayload};
use crate::domain::value_objects::QueueAction;
use crate::infrastructure::database::local_store::LocalStore;
use crate::infrastructure::database::schema::{IDX_BY_SYNCED, OFFLINE_QUEUE};
use crate::shared::error::AppError;
use chrono::Utc;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;

/// Append-only log of pending local actions. Entries survive restarts and
/// are retired only after a confirmed remote application: `mark_synced`
/// first, `prune_synced` second, so a crash in between leaves synced rows
/// that the next drain skips instead of replaying.
pub struct MutationQueue {
    store: Arc<LocalStore>,
}

impl MutationQueue {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Appends immediately. Storage failure here is a hard error: a queued
    /// action is never silently dropped, unlike best-effort cache writes.
    pub async fn enqueue(&self, payload: &QueuePayload) -> Result<i64, AppError> {
        let entry = json!({
            "action": payload.action().as_str(),
            "data": payload.to_data()?,
            "timestamp": Utc::now().timestamp(),
            "synced": false,
        });
        let id = self.store.append(OFFLINE_QUEUE, &entry).await?;
        tracing::debug!(id, action = %payload.action(), "queued offline action");
        Ok(id)
    }

    /// Unsynced entries in replay order: timestamp ascending, id as the
    /// tie-breaker. Later entries may depend on earlier ones (add then
    /// remove of the same key), so the order matters.
    pub async fn list_unsynced(&self) -> Result<Vec<QueueEntry>, AppError> {
        let rows = self
            .store
            .rows_by_index(OFFLINE_QUEUE, IDX_BY_SYNCED, &[json!(false)])
            .await?;
        let mut entries: Vec<QueueEntry> = rows
            .into_iter()
            .filter_map(|(id, value)| match parse_entry(id, &value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    // 壊れた行は再生せずスキップする
                    tracing::warn!(id, error = %e, "skipping malformed queue entry");
                    None
                }
            })
            .collect();
        entries.sort_by_key(|e| (e.timestamp, e.id));
        Ok(entries)
    }

    /// Idempotent: marking an already-synced or nonexistent id is a no-op.
    pub async fn mark_synced(&self, id: i64) -> Result<(), AppError> {
        self.store
            .set_field(OFFLINE_QUEUE, id, "synced", &json!(true))
            .await?;
        Ok(())
    }

    /// Deletes every synced entry. New enqueues are unaffected.
    pub async fn prune_synced(&self) -> Result<u64, AppError> {
        self.store
            .delete_by_index(OFFLINE_QUEUE, IDX_BY_SYNCED, &[json!(true)])
            .await
    }

    pub async fn unsynced_count(&self) -> Result<usize, AppError> {
        Ok(self
            .store
            .rows_by_index(OFFLINE_QUEUE, IDX_BY_SYNCED, &[json!(false)])
            .await?
            .len())
    }

    pub async fn len(&self) -> Result<i64, AppError> {
        self.store.count(OFFLINE_QUEUE).await
    }
}

fn parse_entry(id: i64, value: &Value) -> Result<QueueEntry, AppError> {
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::ValidationError("queue entry has no action".into()))?;
    let action = QueueAction::from_str(action).map_err(AppError::ValidationError)?;
    Ok(QueueEntry {
        id,
        action,
        data: value.get("data").cloned().unwrap_or(Value::Null),
        timestamp: value
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        synced: value
            .get("synced")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::schema::storefront_schema;
    use crate::infrastructure::database::ConnectionPool;

    async fn queue() -> MutationQueue {
        let pool = ConnectionPool::from_memory().await.unwrap();
        let store = Arc::new(
            LocalStore::open(pool.pool().clone(), storefront_schema())
                .await
                .unwrap(),
        );
        MutationQueue::new(store)
    }

    fn cart_add(product_id: &str) -> QueuePayload {
        QueuePayload::AddToCart {
            product_id: product_id.into(),
            quantity: 1,
        }
    }

    #[tokio::test]
    async fn entries_replay_in_enqueue_order() {
        let queue = queue().await;
        for id in ["a", "b", "c"] {
            queue.enqueue(&cart_add(id)).await.unwrap();
        }

        let entries = queue.list_unsynced().await.unwrap();
        let order: Vec<_> = entries
            .iter()
            .map(|e| e.data["product_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn mark_synced_twice_equals_once() {
        let queue = queue().await;
        let id = queue.enqueue(&cart_add("p1")).await.unwrap();

        queue.mark_synced(id).await.unwrap();
        let after_once = queue.list_unsynced().await.unwrap();

        queue.mark_synced(id).await.unwrap();
        let after_twice = queue.list_unsynced().await.unwrap();

        assert_eq!(after_once, after_twice);
        assert!(after_twice.is_empty());
        // 存在しないidもno-op
        queue.mark_synced(9999).await.unwrap();
    }

    #[tokio::test]
    async fn prune_removes_only_synced_entries() {
        let queue = queue().await;
        let first = queue.enqueue(&cart_add("p1")).await.unwrap();
        let _second = queue.enqueue(&cart_add("p2")).await.unwrap();

        queue.mark_synced(first).await.unwrap();
        let removed = queue.prune_synced().await.unwrap();
        assert_eq!(removed, 1);

        let remaining = queue.list_unsynced().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].data["product_id"], "p2");
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ids_are_never_reused_after_prune() {
        let queue = queue().await;
        let first = queue.enqueue(&cart_add("p1")).await.unwrap();
        queue.mark_synced(first).await.unwrap();
        queue.prune_synced().await.unwrap();

        let second = queue.enqueue(&cart_add("p2")).await.unwrap();
        assert!(second > first);
    }
}
