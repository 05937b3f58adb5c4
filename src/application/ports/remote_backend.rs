use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure taxonomy for the remote data service. Callers branch on the
/// variant: `Transient` falls back to the local mirror or stays queued,
/// `NotFound`/`Conflict` are definitive answers.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict on unique key: {0}")]
    Conflict(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            RemoteError::Transient(err.to_string())
        } else {
            RemoteError::Protocol(err.to_string())
        }
    }
}

/// リモートデータサービスへのポート。コレクション名で各レコード種別
/// （products / qr_scan_logs / hygiene_sops / product_qr_codes など）を
/// アドレスする。
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Fetch all records matching the equality filters, newest first where
    /// the collection has a creation timestamp.
    async fn fetch_all(
        &self,
        collection: &str,
        filters: &[(String, Value)],
    ) -> Result<Vec<Value>, RemoteError>;

    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Value, RemoteError>;

    /// Insert a record; the committed record (with any server-assigned id)
    /// is returned.
    async fn insert(&self, collection: &str, record: Value) -> Result<Value, RemoteError>;

    async fn update(&self, collection: &str, id: &str, patch: Value)
        -> Result<Value, RemoteError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;
}
