use crate::application::ports::remote_backend::{RemoteBackend, RemoteError};
use crate::domain::entities::{QueueEntry, QueuePayload};
use crate::infrastructure::connectivity::ConnectivityMonitor;
use crate::infrastructure::offline::MutationQueue;
use crate::shared::error::AppError;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub attempted: u32,
    pub confirmed: u32,
    pub pending: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync: Option<i64>,
    pub last_summary: Option<SyncSummary>,
}

/// Converts queued local actions into confirmed remote state. A drain cycle
/// is triggered by a reconnect transition, replays the unsynced snapshot in
/// FIFO order, and always returns to idle; per-entry failures stay queued
/// for the next cycle.
pub struct SyncService {
    queue: Arc<MutationQueue>,
    backend: Arc<dyn RemoteBackend>,
    monitor: Arc<ConnectivityMonitor>,
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncService {
    pub fn new(
        queue: Arc<MutationQueue>,
        backend: Arc<dyn RemoteBackend>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            queue,
            backend,
            monitor,
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    /// Runs one drain cycle. Returns `None` when a drain is already in
    /// flight; overlapping triggers coalesce into a no-op instead of
    /// double-replaying the same snapshot.
    pub async fn drain(&self) -> Result<Option<SyncSummary>, AppError> {
        {
            let mut status = self.status.write().await;
            if status.is_syncing {
                debug!("drain already in flight, coalescing");
                return Ok(None);
            }
            status.is_syncing = true;
        }

        let result = self.drain_snapshot().await;

        let mut status = self.status.write().await;
        status.is_syncing = false;
        match result {
            Ok(summary) => {
                status.last_sync = Some(Utc::now().timestamp());
                status.last_summary = Some(summary.clone());
                Ok(Some(summary))
            }
            Err(e) => Err(e),
        }
    }

    async fn drain_snapshot(&self) -> Result<SyncSummary, AppError> {
        let entries = self.queue.list_unsynced().await?;
        if entries.is_empty() {
            return Ok(SyncSummary::default());
        }

        info!(count = entries.len(), "draining offline queue");
        let mut summary = SyncSummary {
            attempted: entries.len() as u32,
            ..Default::default()
        };

        for entry in &entries {
            match self.replay(entry).await {
                Ok(()) => {
                    self.queue.mark_synced(entry.id).await?;
                    summary.confirmed += 1;
                }
                Err(e) => {
                    // 1件の失敗でバッチ全体を止めない。次の再接続で再試行される。
                    warn!(id = entry.id, action = %entry.action, error = %e, "replay failed, entry stays queued");
                }
            }
        }

        self.queue.prune_synced().await?;
        summary.pending = self.queue.unsynced_count().await? as u32;
        info!(
            attempted = summary.attempted,
            confirmed = summary.confirmed,
            pending = summary.pending,
            "offline queue drain finished"
        );
        Ok(summary)
    }

    async fn replay(&self, entry: &QueueEntry) -> Result<(), AppError> {
        let payload = entry.payload()?;
        match payload {
            // カート/ウィッシュリストの正はクライアント側。リモート再生は不要。
            QueuePayload::AddToCart { .. }
            | QueuePayload::RemoveFromCart { .. }
            | QueuePayload::AddToWishlist { .. }
            | QueuePayload::RemoveFromWishlist { .. } => Ok(()),

            QueuePayload::EmailSignup { email } => {
                let record = serde_json::json!({
                    "email": email,
                    "signed_up_at": Utc::now(),
                });
                self.apply_insert("email_signups", record).await
            }

            QueuePayload::QrScan(mut log) => {
                // スキャン時点ではオフラインだった
                log.is_online = false;
                log.synced_at = Some(Utc::now());
                let record = serde_json::to_value(&log)?;
                self.apply_insert("qr_scan_logs", record).await
            }
        }
    }

    /// At-least-once delivery means a replay can race an earlier delivery of
    /// the same entry; a duplicate-key conflict is therefore success.
    async fn apply_insert(&self, collection: &str, record: serde_json::Value) -> Result<(), AppError> {
        match self.backend.insert(collection, record).await {
            Ok(_) => Ok(()),
            Err(RemoteError::Conflict(detail)) => {
                debug!(collection, detail = %detail, "record already applied remotely");
                Ok(())
            }
            Err(e) => Err(AppError::Network(e.to_string())),
        }
    }

    /// Watches the connectivity monitor and starts a drain on every
    /// offline→online transition. Transitions are the only trigger; there
    /// is no timer.
    pub fn spawn_reconnect_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut rx = self.monitor.subscribe();
        tokio::spawn(async move {
            let mut was_online = *rx.borrow();
            while rx.changed().await.is_ok() {
                let online = *rx.borrow();
                if online && !was_online {
                    if let Err(e) = service.drain().await {
                        error!(error = %e, "offline queue drain failed");
                    }
                }
                was_online = online;
            }
        })
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }
}
