use crate::shared::error::AppError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
            top_p: 0.9,
        }
    }
}

/// テキスト生成APIへのポート。応答は信頼できない自由形式テキストとして
/// 扱い、JSON抽出は呼び出し側の責務。
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Whether the adapter is configured (API key present). Callers fall
    /// back to deterministic generation when this is false.
    fn is_available(&self) -> bool;

    async fn generate(&self, prompt: &str, options: &GenerationOptions)
        -> Result<String, AppError>;
}
