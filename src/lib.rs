pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod server;
pub mod validation;

use std::sync::Arc;

use config::AppConfig;
use engine::chat::{ChatOptions, ChatService};
use engine::governor::UsageGovernor;
use engine::provider::gateway::GatewayClient;
use error::AppError;

/// Wire storage, collaborators and the HTTP server, then serve until shutdown.
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting wellness-chat v{}", env!("CARGO_PKG_VERSION"));

    let addr = config.bind_addr()?;
    let tz = config.quota.tz()?;
    let policy = config.quota.policy()?;

    let data_dir = config.database.data_dir.clone();
    let pool_size = config.database.pool_size;
    let pool = db::blocking(move || db::init_db(&data_dir, pool_size)).await?;

    let governor = Arc::new(UsageGovernor::new(pool.clone(), policy));
    let backend = Arc::new(GatewayClient::new(&config.gateway)?);
    let auth = Arc::new(auth::SupabaseAuth::new(&config.auth)?);
    let chat = ChatService::new(pool.clone(), governor, backend, ChatOptions::from_config(&config));

    tracing::info!(
        timezone = %tz,
        model = %config.gateway.model,
        faq_min_keywords = config.faq.min_matched_keywords,
        faq_score_floor = config.faq.score_floor,
        "Chat service ready",
    );

    let state = Arc::new(server::AppState { pool, auth, chat, tz });
    server::serve(addr, state, &config.server).await
}
