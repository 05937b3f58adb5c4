#![allow(dead_code)]

use async_trait::async_trait;
use popclozet_core::application::ports::remote_backend::{RemoteBackend, RemoteError};
use popclozet_core::infrastructure::database::schema::storefront_schema;
use popclozet_core::infrastructure::database::{ConnectionPool, LocalStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Programmable in-memory stand-in for the remote data service. Records
/// every call so tests can assert call order and payloads.
#[derive(Default)]
pub struct StubBackend {
    /// fetch_all/fetch_by_id が返すレコード
    pub records: Mutex<Vec<Value>>,
    /// trueの間、読み取りは一時的エラーになる
    pub fail_reads: AtomicBool,
    /// このマーカーを含むinsertは一時的エラーになる
    pub fail_insert_containing: Mutex<Option<String>>,
    /// insertをこのミリ秒だけ遅延させる
    pub insert_delay_ms: AtomicU64,
    /// (operation, collection, payload)
    pub calls: Mutex<Vec<(String, String, Value)>>,
}

impl StubBackend {
    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    pub fn set_records(&self, records: Vec<Value>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts_containing(&self, marker: Option<&str>) {
        *self.fail_insert_containing.lock().unwrap() = marker.map(str::to_string);
    }

    pub fn inserts(&self, collection: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, c, _)| op == "insert" && c == collection)
            .map(|(_, _, payload)| payload.clone())
            .collect()
    }

    pub fn insert_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _, _)| op == "insert")
            .count()
    }

    fn record_call(&self, op: &str, collection: &str, payload: Value) {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), collection.to_string(), payload));
    }
}

#[async_trait]
impl RemoteBackend for StubBackend {
    async fn fetch_all(
        &self,
        collection: &str,
        filters: &[(String, Value)],
    ) -> Result<Vec<Value>, RemoteError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("stub remote unreachable".into()));
        }
        self.record_call("fetch_all", collection, json!(filters.len()));
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .filter(|record| filters.iter().all(|(k, v)| record.get(k) == Some(v)))
            .cloned()
            .collect())
    }

    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Value, RemoteError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("stub remote unreachable".into()));
        }
        self.record_call("fetch_by_id", collection, json!(id));
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn insert(&self, collection: &str, record: Value) -> Result<Value, RemoteError> {
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let marker = self.fail_insert_containing.lock().unwrap().clone();
        if let Some(marker) = marker {
            if record.to_string().contains(&marker) {
                return Err(RemoteError::Transient("stub insert failure".into()));
            }
        }
        self.record_call("insert", collection, record.clone());
        let mut committed = record;
        if committed.get("id").map_or(true, Value::is_null) {
            let n = self.calls.lock().unwrap().len();
            committed["id"] = json!(format!("r{n}"));
        }
        Ok(committed)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, RemoteError> {
        self.record_call("update", collection, json!({ "id": id, "patch": patch }));
        Ok(patch)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.record_call("delete", collection, json!(id));
        Ok(())
    }
}

pub async fn memory_store() -> Arc<LocalStore> {
    let pool = ConnectionPool::from_memory().await.unwrap();
    Arc::new(
        LocalStore::open(pool.pool().clone(), storefront_schema())
            .await
            .unwrap(),
    )
}

/// 条件が満たされるまでポーリングする (最大2秒)
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

pub fn product(id: &str, gender: &str, event: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Item {id}"),
        "price": 900.0,
        "gender": gender,
        "event_category": event,
        "image_url": format!("https://cdn.example.com/{id}.jpg"),
        "color": "blue",
        "rating": 4.0,
        "is_available": true,
    })
}
