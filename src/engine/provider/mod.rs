pub mod gateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// =============================================================================
// Prompt
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }
}

/// Structured prompt handed to a generative backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPrompt {
    pub messages: Vec<PromptMessage>,
}

// =============================================================================
// Errors
// =============================================================================

/// Typed failure from a generative backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Provider-side rate limit.
    #[error("Rate limits exceeded, please try again later.")]
    RateLimited,
    /// Provider-side credits / capacity exhausted.
    #[error("AI service is temporarily unavailable. Please try again later.")]
    CapacityExceeded,
    /// Anything else: transport failure (no status) or unexpected status.
    #[error("AI gateway error{}: {message}", status_suffix(.status))]
    Other { status: Option<u16>, message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl From<GenerationError> for AppError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::RateLimited => AppError::GenerativeRateLimited(e.to_string()),
            GenerationError::CapacityExceeded => AppError::GenerativeCapacityExceeded(e.to_string()),
            GenerationError::Other { status, message } => AppError::UpstreamUnknown {
                status: status.unwrap_or(0),
                message,
            },
        }
    }
}

// =============================================================================
// GenerativeBackend trait
// =============================================================================

/// A capability that turns a structured prompt into free text.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &ChatPrompt) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_errors_map_to_app_errors() {
        assert!(matches!(
            AppError::from(GenerationError::RateLimited),
            AppError::GenerativeRateLimited(ref m) if m.contains("Rate limits")
        ));
        assert!(matches!(
            AppError::from(GenerationError::CapacityExceeded),
            AppError::GenerativeCapacityExceeded(_)
        ));
        assert!(matches!(
            AppError::from(GenerationError::Other { status: Some(503), message: "down".into() }),
            AppError::UpstreamUnknown { status: 503, .. }
        ));
    }

    #[test]
    fn test_other_error_display() {
        let with = GenerationError::Other { status: Some(500), message: "boom".into() };
        assert_eq!(with.to_string(), "AI gateway error (status 500): boom");
        let without = GenerationError::Other { status: None, message: "connect refused".into() };
        assert_eq!(without.to_string(), "AI gateway error: connect refused");
    }

    #[test]
    fn test_prompt_role_serializes_lowercase() {
        let json = serde_json::to_value(PromptMessage::system("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "system", "content": "hi" }));
    }
}
