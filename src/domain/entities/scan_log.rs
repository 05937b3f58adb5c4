use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// QRスキャンの記録。リモートの `qr_scan_logs` コレクションの行と同じ形。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanLog {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    pub qr_code_data: String,
    pub scan_timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub is_online: bool,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
}

fn default_metadata() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ScanLog {
    pub fn new(
        qr_code_data: String,
        product_id: Option<String>,
        user_agent: String,
        is_online: bool,
    ) -> Self {
        Self {
            // クライアント採番のIDが再送時の重複キーになる
            id: Some(Uuid::new_v4().to_string()),
            product_id,
            qr_code_data,
            scan_timestamp: Utc::now(),
            user_agent,
            is_online,
            synced_at: None,
            metadata: default_metadata(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_scans: u64,
    pub online_scans: u64,
    pub offline_scans: u64,
    pub unique_products: u64,
}
