use serde::Serialize;

/// App-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes as `{ error, kind }`; the HTTP layer maps variants to status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Short-window burst guard rejected the request.
    #[error("Too many requests, retry in {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Daily message limit reached")]
    QuotaExceeded { limit: u32, current: u32 },

    /// Provider-side rate limit (HTTP 429 from the AI gateway).
    #[error("{0}")]
    GenerativeRateLimited(String),

    /// Provider-side credit/capacity exhaustion (HTTP 402 from the AI gateway).
    #[error("{0}")]
    GenerativeCapacityExceeded(String),

    #[error("AI gateway error (status {status}): {message}")]
    UpstreamUnknown { status: u16, message: String },

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable discriminator, also used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database",
            AppError::Pool(_) => "pool",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Io(_) => "io",
            AppError::Serde(_) => "serde",
            AppError::Config(_) => "config",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::TooManyRequests { .. } => "too_many_requests",
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::GenerativeRateLimited(_) => "generative_rate_limited",
            AppError::GenerativeCapacityExceeded(_) => "generative_capacity_exceeded",
            AppError::UpstreamUnknown { .. } => "upstream_unknown",
            AppError::Internal(_) => "internal",
        }
    }

    /// True for persistence failures (`StorageError` in the HTTP contract).
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Pool(_))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(e: toml::de::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Blocking task failed: {e}"))
    }
}

/// Serialized as `{ error: "...", kind: "..." }` for API consumers.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}
