use crate::application::ports::remote_backend::{RemoteBackend, RemoteError};
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// reqwestベースのリモートバックエンドクライアント。コレクションごとの
/// RESTリソース (`GET /products`, `POST /qr_scan_logs`, ...) を想定する。
#[derive(Clone)]
pub struct HttpRemoteBackend {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpRemoteBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(RemoteError::Protocol("remote base URL is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Protocol(e.to_string()))?;
        Ok(Self {
            base_url: trimmed.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl RemoteBackend for HttpRemoteBackend {
    async fn fetch_all(
        &self,
        collection: &str,
        filters: &[(String, Value)],
    ) -> Result<Vec<Value>, RemoteError> {
        let query: Vec<(String, String)> = filters
            .iter()
            .map(|(k, v)| (k.clone(), query_value(v)))
            .collect();
        let resp = self
            .request(Method::GET, &format!("/{collection}"))
            .query(&query)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let body: Value = resp.json().await?;
        match body {
            Value::Array(records) => Ok(records),
            other => Err(RemoteError::Protocol(format!(
                "expected an array from /{collection}, got {other}"
            ))),
        }
    }

    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Value, RemoteError> {
        let resp = self
            .request(Method::GET, &format!("/{collection}/{id}"))
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    async fn insert(&self, collection: &str, record: Value) -> Result<Value, RemoteError> {
        let resp = self
            .request(Method::POST, &format!("/{collection}"))
            .json(&record)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<Value, RemoteError> {
        let resp = self
            .request(Method::PATCH, &format!("/{collection}/{id}"))
            .json(&patch)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let resp = self
            .request(Method::DELETE, &format!("/{collection}/{id}"))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn ensure_success(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(detail),
        StatusCode::CONFLICT => RemoteError::Conflict(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::PermissionDenied(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            RemoteError::Transient(format!("{status}: {detail}"))
        }
        s if s.is_server_error() => RemoteError::Transient(format!("{status}: {detail}")),
        _ => RemoteError::Protocol(format!("{status}: {detail}")),
    })
}
