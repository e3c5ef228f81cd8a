use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::ContentType;

/// Free-text prompt in, free-text completion out.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Short name for logs (e.g. "gemini-2.0-flash").
    fn name(&self) -> &str;
}

/// Keyword search against the legal-information API.
///
/// Best effort: `None` covers transport errors, timeouts, non-200 responses
/// and unparseable bodies alike. Implementations must not return errors.
#[async_trait]
pub trait LegalDataSource: Send + Sync {
    async fn search(&self, keyword: &str, content_type: ContentType) -> Option<Value>;
}
