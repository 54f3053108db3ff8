use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AppError;

/// Identity resolved from a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

/// Maps a bearer session token to a stable user id.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, AppError>;
}

// ---------------------------------------------------------------------------
// Supabase
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SupabaseUserResponse {
    id: String,
    email: Option<String>,
}

/// Verifies tokens against Supabase Auth (`GET /auth/v1/user`).
pub struct SupabaseAuth {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuth {
    pub fn new(config: &AuthConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build auth client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        })
    }
}

#[async_trait]
impl AuthVerifier for SupabaseAuth {
    async fn verify(&self, token: &str) -> Result<AuthUser, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::Unauthorized("Missing session token".into()));
        }

        let resp = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Auth service unreachable: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Unauthorized("Invalid or expired session".into()));
        }
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "Auth service returned an unexpected status");
            return Err(AppError::Internal(format!("Auth service error (status {status})")));
        }

        let user: SupabaseUserResponse = resp
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Malformed auth response: {e}")))?;
        if user.id.trim().is_empty() {
            return Err(AppError::Unauthorized("Session has no user".into()));
        }

        Ok(AuthUser {
            id: user.id,
            email: user.email,
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let value = header.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthorized("Malformed Authorization header".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AppError::Unauthorized("Malformed Authorization header".into()));
    }
    Ok(token.trim())
}
