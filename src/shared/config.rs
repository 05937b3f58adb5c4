use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub ai: AiConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
    pub scans: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// ミラーエントリの掃除に使う最大許容経過秒数。
    pub cache_max_age_secs: i64,
    #[serde(default)]
    pub legacy_store_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub max_scans_per_minute: usize,
    pub history_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: format!(
                    "sqlite://{}?mode=rwc",
                    default_data_dir().join("popclozet.db").display()
                ),
                max_connections: 5,
                connection_timeout: 30,
            },
            remote: RemoteConfig {
                base_url: "http://localhost:8000".to_string(),
                api_key: None,
                request_timeout: 30,
            },
            ai: AiConfig {
                endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: None,
                model: "gemini-2.0-flash-exp".to_string(),
                temperature: 0.7,
                max_tokens: 2000,
                top_p: 0.9,
                request_timeout: 30,
            },
            sync: SyncConfig { auto_sync: true },
            storage: StorageConfig {
                data_dir: default_data_dir().display().to_string(),
                // 7 days
                cache_max_age_secs: 7 * 24 * 60 * 60,
                legacy_store_path: None,
            },
            scans: ScanConfig {
                max_scans_per_minute: 10,
                history_limit: 50,
            },
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("./data"))
        .join("popclozet")
}
