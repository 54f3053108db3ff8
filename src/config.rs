//! Layered service configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file
//! (`WELLNESS_CONFIG`, or `wellness.toml` in the working directory), then
//! environment variables. A `.env` file is loaded before env lookup.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;

use crate::engine::tier::{QuotaPolicy, Tier};
use crate::error::AppError;

const DEFAULT_CONFIG_FILE: &str = "wellness.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub gateway: GatewayConfig,
    pub quota: QuotaConfig,
    pub faq: FaqConfig,
    pub prompt: PromptConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".into(),
            cors_origins: Vec::new(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub data_dir: PathBuf,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            pool_size: 8,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub supabase_url: String,
    /// Public anon key sent as the `apikey` header.
    pub supabase_anon_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ai.gateway.lovable.dev".into(),
            api_key: String::new(),
            model: "google/gemini-2.5-flash".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// IANA zone used to decide when the daily counter rolls over.
    pub timezone: String,
    /// Tier → messages per day. Tiers missing here are treated as undefined.
    pub daily_limits: BTreeMap<Tier, u32>,
    /// Tier whose limit applies to tiers with no defined limit.
    pub fallback_tier: Tier,
    pub burst_max: usize,
    pub burst_window_secs: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".into(),
            daily_limits: QuotaPolicy::default_limits(),
            fallback_tier: Tier::Free,
            burst_max: 5,
            burst_window_secs: 10,
        }
    }
}

impl QuotaConfig {
    pub fn tz(&self) -> Result<Tz, AppError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| AppError::Config(format!("Unknown timezone '{}'", self.timezone)))
    }

    pub fn policy(&self) -> Result<QuotaPolicy, AppError> {
        QuotaPolicy::new(self.daily_limits.clone(), self.fallback_tier)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaqConfig {
    pub min_matched_keywords: usize,
    /// A candidate with fewer matched keywords must score strictly above this.
    pub score_floor: usize,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            min_matched_keywords: 2,
            score_floor: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub episode_history_limit: u32,
    pub max_message_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            episode_history_limit: 10,
            max_message_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// When set, logs are also written to a daily-rolling file here.
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load `.env`, the optional TOML file, and env overrides, then validate.
    pub fn load() -> Result<Self, AppError> {
        // A missing .env is the normal production case.
        let _ = dotenvy::dotenv();

        let explicit = std::env::var("WELLNESS_CONFIG").ok();
        let mut config = match explicit.as_deref() {
            Some(path) => Self::from_file(Path::new(path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, AppError> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay environment variables. `lookup` is injected so tests don't
    /// have to mutate process env.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("WELLNESS_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = get("WELLNESS_DATA_DIR") {
            self.database.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("SUPABASE_URL") {
            self.auth.supabase_url = v;
        }
        if let Some(v) = get("SUPABASE_ANON_KEY") {
            self.auth.supabase_anon_key = v;
        }
        if let Some(v) = get("AI_GATEWAY_URL") {
            self.gateway.base_url = v;
        }
        if let Some(v) = get("AI_GATEWAY_API_KEY") {
            self.gateway.api_key = v;
        }
        if let Some(v) = get("AI_GATEWAY_MODEL") {
            self.gateway.model = v;
        }
        if let Some(v) = get("WELLNESS_TIMEZONE") {
            self.quota.timezone = v;
        }
        if let Some(v) = get("WELLNESS_LOG_FORMAT") {
            match v.to_lowercase().as_str() {
                "json" => self.logging.format = LogFormat::Json,
                "compact" => self.logging.format = LogFormat::Compact,
                other => tracing::warn!(value = %other, "Ignoring unknown WELLNESS_LOG_FORMAT"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.bind_addr()?;
        self.quota.tz()?;
        self.quota.policy()?;

        if self.auth.supabase_url.trim().is_empty() {
            return Err(AppError::Config("SUPABASE_URL is not configured".into()));
        }
        if self.auth.supabase_anon_key.trim().is_empty() {
            return Err(AppError::Config("SUPABASE_ANON_KEY is not configured".into()));
        }
        if self.gateway.api_key.trim().is_empty() {
            return Err(AppError::Config("AI_GATEWAY_API_KEY is not configured".into()));
        }
        if self.quota.burst_max == 0 || self.quota.burst_window_secs == 0 {
            return Err(AppError::Config("quota.burst_max and quota.burst_window_secs must be positive".into()));
        }
        if self.faq.min_matched_keywords == 0 {
            return Err(AppError::Config("faq.min_matched_keywords must be at least 1".into()));
        }
        if self.database.pool_size == 0 {
            return Err(AppError::Config("database.pool_size must be positive".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        self.server
            .bind_addr
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid bind address '{}': {e}", self.server.bind_addr)))
    }
}
