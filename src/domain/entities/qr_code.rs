use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const QR_URI_PREFIX: &str = "popclozet://product/";

/// 発行済みQRコード。`qr_data` は `popclozet://product/{id}` 形式。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCode {
    #[serde(default)]
    pub id: Option<String>,
    pub product_id: String,
    pub qr_data: String,
    pub generated_at: DateTime<Utc>,
}

impl QrCode {
    pub fn for_product(product_id: &str) -> Self {
        Self {
            id: None,
            product_id: product_id.to_string(),
            qr_data: format!("{QR_URI_PREFIX}{product_id}"),
            generated_at: Utc::now(),
        }
    }
}
