use crate::application::ports::qr_encoder::QrImageEncoder;
use crate::application::ports::remote_backend::{RemoteBackend, RemoteError};
use crate::domain::entities::qr_code::{QrCode, QR_URI_PREFIX};
use crate::shared::error::AppError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

const COLLECTION: &str = "product_qr_codes";

/// QRコードの発行・検証・画像化。`qr_data` は決定的なURI形式なので、
/// 再生成してもスキャン済みのラベルは無効にならない。
pub struct QrCodeService {
    backend: Arc<dyn RemoteBackend>,
    encoder: Option<Arc<dyn QrImageEncoder>>,
}

impl QrCodeService {
    pub fn new(backend: Arc<dyn RemoteBackend>, encoder: Option<Arc<dyn QrImageEncoder>>) -> Self {
        Self { backend, encoder }
    }

    /// Issues (or re-issues) the QR record for a product. A duplicate on the
    /// remote side is resolved by fetching the existing record.
    pub async fn issue(&self, product_id: &str) -> Result<QrCode, AppError> {
        let mut code = QrCode::for_product(product_id);
        match self
            .backend
            .insert(COLLECTION, serde_json::to_value(&code)?)
            .await
        {
            Ok(committed) => {
                code.id = committed.get("id").and_then(Value::as_str).map(str::to_string);
                Ok(code)
            }
            Err(RemoteError::Conflict(_)) => self
                .get_for_product(product_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("qr code for `{product_id}`"))),
            Err(e) => {
                // リモート記録は後追いできるので、発行自体は成功させる
                warn!(product_id, error = %e, "qr record store failed, returning local code");
                Ok(code)
            }
        }
    }

    pub async fn get_for_product(&self, product_id: &str) -> Result<Option<QrCode>, AppError> {
        let filters = [(
            "product_id".to_string(),
            Value::String(product_id.to_string()),
        )];
        match self.backend.fetch_all(COLLECTION, &filters).await {
            Ok(records) => Ok(records
                .into_iter()
                .find_map(|r| serde_json::from_value(r).ok())),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(e) => {
                warn!(product_id, error = %e, "qr record fetch failed");
                Ok(None)
            }
        }
    }

    pub async fn regenerate(&self, product_id: &str) -> Result<QrCode, AppError> {
        match self.get_for_product(product_id).await? {
            Some(mut existing) => {
                existing.generated_at = Utc::now();
                if let Some(id) = existing.id.clone() {
                    let patch = json!({ "generated_at": existing.generated_at });
                    if let Err(e) = self.backend.update(COLLECTION, &id, patch).await {
                        warn!(product_id, error = %e, "qr record refresh failed");
                    }
                }
                Ok(existing)
            }
            None => self.issue(product_id).await,
        }
    }

    /// Parses scanned data back to a product id. Accepts the canonical URI
    /// form and a JSON object carrying `product_id`.
    pub fn validate(&self, data: &str) -> Option<String> {
        let trimmed = data.trim();
        if let Some(id) = trimmed.strip_prefix(QR_URI_PREFIX) {
            return (!id.is_empty()).then(|| id.to_string());
        }
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            if let Some(id) = value
                .get("product_id")
                .or_else(|| value.get("productId"))
                .and_then(Value::as_str)
            {
                return (!id.is_empty()).then(|| id.to_string());
            }
        }
        None
    }

    /// PNG data URL for display or printing.
    pub fn encode_image(&self, code: &QrCode) -> Result<String, AppError> {
        let encoder = self.encoder.as_ref().ok_or_else(|| {
            AppError::ConfigurationError("no QR image encoder configured".into())
        })?;
        let bytes = encoder.encode(&code.qr_data)?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEncoder;

    impl QrImageEncoder for StubEncoder {
        fn encode(&self, data: &str) -> Result<Vec<u8>, AppError> {
            Ok(data.as_bytes().to_vec())
        }
    }

    struct NoopBackend;

    #[async_trait::async_trait]
    impl RemoteBackend for NoopBackend {
        async fn fetch_all(
            &self,
            _collection: &str,
            _filters: &[(String, Value)],
        ) -> Result<Vec<Value>, RemoteError> {
            Ok(Vec::new())
        }

        async fn fetch_by_id(&self, _c: &str, id: &str) -> Result<Value, RemoteError> {
            Err(RemoteError::NotFound(id.to_string()))
        }

        async fn insert(&self, _c: &str, record: Value) -> Result<Value, RemoteError> {
            Ok(record)
        }

        async fn update(&self, _c: &str, _id: &str, patch: Value) -> Result<Value, RemoteError> {
            Ok(patch)
        }

        async fn delete(&self, _c: &str, _id: &str) -> Result<(), RemoteError> {
            Ok(())
        }
    }

    fn service() -> QrCodeService {
        QrCodeService::new(Arc::new(NoopBackend), Some(Arc::new(StubEncoder)))
    }

    #[test]
    fn validate_accepts_uri_and_json_forms() {
        let service = service();
        assert_eq!(
            service.validate("popclozet://product/p42"),
            Some("p42".to_string())
        );
        assert_eq!(
            service.validate(r#"{"product_id": "p42"}"#),
            Some("p42".to_string())
        );
        assert_eq!(
            service.validate(r#"{"productId": "p42"}"#),
            Some("p42".to_string())
        );
        assert_eq!(service.validate("https://elsewhere.example/x"), None);
        assert_eq!(service.validate("popclozet://product/"), None);
    }

    #[tokio::test]
    async fn issue_builds_canonical_uri() {
        let code = service().issue("p42").await.unwrap();
        assert_eq!(code.qr_data, "popclozet://product/p42");
        assert_eq!(code.product_id, "p42");
    }

    #[test]
    fn encode_image_returns_data_url() {
        let service = service();
        let code = QrCode::for_product("p1");
        let url = service.encode_image(&code).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn encode_without_encoder_is_a_configuration_error() {
        let service = QrCodeService::new(Arc::new(NoopBackend), None);
        let err = service.encode_image(&QrCode::for_product("p1")).unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
    }
}
