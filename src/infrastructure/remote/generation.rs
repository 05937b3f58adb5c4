use crate::application::ports::text_generator::{GenerationOptions, TextGenerator};
use crate::shared::config::AiConfig;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Gemini `generateContent` 互換エンドポイントへのアダプタ。APIキーが
/// 未設定の場合は `is_available` が false になり、呼び出し側は決定的な
/// フォールバック生成に切り替える。
pub struct GeminiTextGenerator {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    http: reqwest::Client,
}

impl GeminiTextGenerator {
    pub fn from_config(config: &AiConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            http,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiTextGenerator {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, AppError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            AppError::ConfigurationError("text generation API key is not set".into())
        })?;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.endpoint, self.model, api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": options.temperature,
                "topP": options.top_p,
                "maxOutputTokens": options.max_tokens,
            },
        });

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(AppError::Network(format!(
                "text generation failed: {status}: {detail}"
            )));
        }

        let payload: Value = resp.json().await?;
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::SerializationError("generation response carries no text part".into())
            })
    }
}
