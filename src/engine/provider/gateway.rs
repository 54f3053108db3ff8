use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ChatPrompt, GenerationError, GenerativeBackend, PromptMessage};
use crate::config::GatewayConfig;
use crate::error::AppError;

/// Longest slice of an upstream error body kept for logs.
const MAX_ERROR_BODY_CHARS: usize = 500;

// ============================================================================
// Wire types (OpenAI-compatible chat completions)
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// GatewayClient
// ============================================================================

/// HTTP client for the AI gateway's `/v1/chat/completions` endpoint.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build AI gateway client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// Map a non-success status to the typed failure.
fn classify_status(status: reqwest::StatusCode, body: &str) -> GenerationError {
    match status.as_u16() {
        429 => GenerationError::RateLimited,
        402 => GenerationError::CapacityExceeded,
        code => GenerationError::Other {
            status: Some(code),
            message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        },
    }
}

#[async_trait]
impl GenerativeBackend for GatewayClient {
    fn name(&self) -> &'static str {
        "ai-gateway"
    }

    async fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &prompt.messages,
        };

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Other {
                status: None,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let err = classify_status(status, &text);
            tracing::warn!(status = status.as_u16(), model = %self.model, "AI gateway call failed: {}", err);
            return Err(err);
        }

        let parsed: CompletionResponse = resp.json().await.map_err(|e| GenerationError::Other {
            status: Some(status.as_u16()),
            message: format!("Malformed completion response: {e}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GenerationError::Other {
                status: Some(status.as_u16()),
                message: "Completion contained no text".into(),
            })
    }
}
