use crate::application::ports::remote_backend::RemoteBackend;
use crate::domain::entities::{QueuePayload, ScanLog, ScanStats};
use crate::infrastructure::connectivity::ConnectivityMonitor;
use crate::infrastructure::offline::MutationQueue;
use crate::shared::config::ScanConfig;
use crate::shared::error::AppError;
use crate::shared::rate_limiter::RateLimiter;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const COLLECTION: &str = "qr_scan_logs";
const RATE_KEY: &str = "qr_scan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Written straight to the scan-log collection.
    Logged,
    /// Queued; the next drain cycle will replay it.
    Queued,
}

/// QRスキャンの記録と集計。オンラインなら直接リモートへ、失敗時と
/// オフライン時はキューへ退避する。
pub struct ScanTrackingService {
    backend: Arc<dyn RemoteBackend>,
    queue: Arc<MutationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    limiter: RateLimiter,
    history_limit: u32,
}

impl ScanTrackingService {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        queue: Arc<MutationQueue>,
        monitor: Arc<ConnectivityMonitor>,
        config: &ScanConfig,
    ) -> Self {
        Self {
            backend,
            queue,
            monitor,
            limiter: RateLimiter::new(config.max_scans_per_minute, Duration::from_secs(60)),
            history_limit: config.history_limit,
        }
    }

    pub async fn log_scan(
        &self,
        qr_code_data: &str,
        product_id: Option<&str>,
        user_agent: &str,
        metadata: Option<Value>,
    ) -> Result<ScanOutcome, AppError> {
        self.limiter
            .check_and_record(RATE_KEY, "QR scan rate limit exceeded")
            .await?;

        let is_online = self.monitor.is_online();
        let mut log = ScanLog::new(
            qr_code_data.to_string(),
            product_id.map(str::to_string),
            user_agent.to_string(),
            is_online,
        );
        if let Some(metadata) = metadata {
            log = log.with_metadata(metadata);
        }

        if is_online {
            log.synced_at = Some(Utc::now());
            let record = serde_json::to_value(&log)?;
            match self.backend.insert(COLLECTION, record).await {
                Ok(_) => {
                    info!(qr = qr_code_data, "scan logged");
                    return Ok(ScanOutcome::Logged);
                }
                Err(e) => {
                    // 書き込み失敗はキュー退避でリカバリする
                    warn!(error = %e, "scan insert failed, queueing for sync");
                    log.synced_at = None;
                }
            }
        }

        self.queue.enqueue(&QueuePayload::QrScan(log)).await?;
        Ok(ScanOutcome::Queued)
    }

    pub async fn scan_history(&self, product_id: &str) -> Result<Vec<ScanLog>, AppError> {
        let filters = [(
            "product_id".to_string(),
            Value::String(product_id.to_string()),
        )];
        match self.backend.fetch_all(COLLECTION, &filters).await {
            Ok(records) => Ok(self.sorted_logs(records)),
            Err(e) => {
                warn!(product_id, error = %e, "scan history unavailable");
                Ok(Vec::new())
            }
        }
    }

    pub async fn all_scans(&self) -> Result<Vec<ScanLog>, AppError> {
        match self.backend.fetch_all(COLLECTION, &[]).await {
            Ok(records) => Ok(self.sorted_logs(records)),
            Err(e) => {
                warn!(error = %e, "scan list unavailable");
                Ok(Vec::new())
            }
        }
    }

    pub async fn scan_stats(&self) -> Result<ScanStats, AppError> {
        let records = match self.backend.fetch_all(COLLECTION, &[]).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "scan stats unavailable");
                return Ok(ScanStats::default());
            }
        };

        let logs: Vec<ScanLog> = records
            .into_iter()
            .filter_map(|r| serde_json::from_value(r).ok())
            .collect();
        let total = logs.len() as u64;
        let online = logs.iter().filter(|l| l.is_online).count() as u64;
        let unique: HashSet<&str> = logs
            .iter()
            .filter_map(|l| l.product_id.as_deref())
            .collect();

        Ok(ScanStats {
            total_scans: total,
            online_scans: online,
            offline_scans: total - online,
            unique_products: unique.len() as u64,
        })
    }

    pub async fn remaining_scans(&self) -> usize {
        self.limiter.remaining(RATE_KEY).await
    }

    fn sorted_logs(&self, records: Vec<Value>) -> Vec<ScanLog> {
        let mut logs: Vec<ScanLog> = records
            .into_iter()
            .filter_map(|r| match serde_json::from_value(r) {
                Ok(log) => Some(log),
                Err(e) => {
                    warn!(error = %e, "skipping malformed scan log");
                    None
                }
            })
            .collect();
        logs.sort_by(|a, b| b.scan_timestamp.cmp(&a.scan_timestamp));
        logs.truncate(self.history_limit as usize);
        logs
    }
}
