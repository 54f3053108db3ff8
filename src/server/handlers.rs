use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use super::AppState;
use crate::auth::{bearer_token, AuthUser};
use crate::db;
use crate::db::models::{CreateFaqInput, FaqEntry, UpdateFaqInput};
use crate::db::repos::faq as faq_repo;
use crate::engine::chat::ChatReply;
use crate::engine::governor::{local_date, UsageSnapshot};
use crate::engine::tier::Tier;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Resolve the caller from the `Authorization` header.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let header = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = bearer_token(header)?;
    state.auth.verify(token).await
}

async fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let user = authenticate(state, headers).await?;
    if state.chat.tier_for(&user.id).await? != Tier::Admin {
        tracing::warn!(user_id = %user.id, "Non-admin attempted an admin route");
        return Err(AppError::Forbidden("Admin role required".into()));
    }
    Ok(user)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| AppError::Validation(e.body_text()))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "wellness-chat",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let req = json_body(payload)?;

    let now = Utc::now();
    let today = local_date(now, state.tz);
    let reply = state.chat.handle(&user.id, &req.message, today, now).await?;
    Ok(Json(reply))
}

/// GET /chat/usage
pub async fn usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UsageSnapshot>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let today = local_date(Utc::now(), state.tz);
    Ok(Json(state.chat.usage(&user.id, today).await?))
}

/// GET /admin/faq
pub async fn list_faq(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<FaqEntry>>, AppError> {
    require_admin(&state, &headers).await?;
    let pool = state.pool.clone();
    Ok(Json(db::blocking(move || faq_repo::list_all(&pool)).await?))
}

/// POST /admin/faq
pub async fn create_faq(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateFaqInput>, JsonRejection>,
) -> Result<Json<FaqEntry>, AppError> {
    let admin = require_admin(&state, &headers).await?;
    let input = json_body(payload)?;

    let pool = state.pool.clone();
    let entry = db::blocking(move || faq_repo::create(&pool, input)).await?;
    tracing::info!(admin_id = %admin.id, faq_id = %entry.id, "FAQ entry created");
    Ok(Json(entry))
}

/// PATCH /admin/faq/{id}
pub async fn update_faq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateFaqInput>, JsonRejection>,
) -> Result<Json<FaqEntry>, AppError> {
    let admin = require_admin(&state, &headers).await?;
    let input = json_body(payload)?;

    let pool = state.pool.clone();
    let entry = db::blocking(move || faq_repo::update(&pool, &id, input)).await?;
    tracing::info!(admin_id = %admin.id, faq_id = %entry.id, "FAQ entry updated");
    Ok(Json(entry))
}
