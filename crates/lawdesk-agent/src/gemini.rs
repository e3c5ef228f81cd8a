use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lawdesk_core::{
    backend::LlmBackend,
    config::{Config, DEFAULT_GEMINI_ENDPOINT},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Calls Gemini's `generateContent` REST API with a single user prompt.
///
/// Stateless: every call is one independent request. No retries; errors go
/// back to the pipeline, which fails the turn.
pub struct GeminiBackend {
    pub endpoint: String,
    pub model: String,
    /// 0 = wait for the service indefinitely.
    pub timeout_secs: u64,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_GEMINI_ENDPOINT.into(),
            model: model.into(),
            timeout_secs: 0,
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.gemini_api_key.clone(), config.gemini_model.clone())
            .with_endpoint(&config.gemini_endpoint)
            .with_timeout(config.llm_timeout_s)
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Concatenated text parts of the first candidate, plus its finish reason.
fn first_candidate_text(resp: GenerateResponse) -> (String, Option<String>) {
    let Some(candidate) = resp.candidates.into_iter().next() else {
        return (String::new(), None);
    };
    let text = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();
    (text, candidate.finish_reason)
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        info!(model = %self.model, prompt_len = prompt.len(), "calling gemini generateContent");

        let mut request = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        if self.timeout_secs > 0 {
            request = request.timeout(std::time::Duration::from_secs(self.timeout_secs));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(model = %self.model, timeout_secs = self.timeout_secs, "gemini request timed out");
                bail!("gemini request timed out after {}s", self.timeout_secs);
            },
            Err(e) => return Err(e).context("gemini request failed"),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %self.model, status = %status, "gemini returned non-success: {}", truncate(&body, 320));
            bail!("gemini error {}: {}", status, truncate(&body, 320));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("failed to parse gemini response")?;
        let (output, finish_reason) = first_candidate_text(parsed);

        if output.trim().is_empty() {
            warn!(model = %self.model, ?finish_reason, "gemini returned no text");
            bail!(
                "gemini returned no text (finish reason: {})",
                finish_reason.as_deref().unwrap_or("none")
            );
        }

        info!(model = %self.model, output_len = output.len(), "gemini response received");
        Ok(output)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
