use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::AppError;

pub const UPGRADE_MESSAGE: &str = "Upgrade to a premium subscription for more daily messages.";

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests { .. }
            | AppError::QuotaExceeded { .. }
            | AppError::GenerativeRateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::GenerativeCapacityExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Io(_)
            | AppError::Serde(_)
            | AppError::Config(_)
            | AppError::UpstreamUnknown { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            AppError::QuotaExceeded { limit, current } => {
                let body = json!({
                    "error": self.to_string(),
                    "limit": limit,
                    "current": current,
                    "upgradeMessage": UPGRADE_MESSAGE,
                });
                return (status, Json(body)).into_response();
            }
            AppError::TooManyRequests { retry_after_secs } => {
                let mut resp = (status, Json(json!({ "error": self.to_string() }))).into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    resp.headers_mut().insert(header::RETRY_AFTER, value);
                }
                return resp;
            }
            _ => {}
        }

        // Storage and internal details stay in the logs.
        let message = if self.is_storage() {
            tracing::error!(kind = self.kind(), "Storage failure: {}", self);
            "Storage is temporarily unavailable".to_string()
        } else if let AppError::UpstreamUnknown { status, .. } = &self {
            tracing::error!(kind = self.kind(), status = *status, "Upstream failure: {}", self);
            "AI service error".to_string()
        } else if matches!(self, AppError::Io(_) | AppError::Serde(_) | AppError::Config(_) | AppError::Internal(_)) {
            tracing::error!(kind = self.kind(), "Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message, "kind": self.kind() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Unauthorized("x".into()), 401),
            (AppError::Forbidden("x".into()), 403),
            (AppError::Validation("x".into()), 400),
            (AppError::NotFound("x".into()), 404),
            (AppError::QuotaExceeded { limit: 3, current: 3 }, 429),
            (AppError::GenerativeRateLimited("x".into()), 429),
            (AppError::GenerativeCapacityExceeded("x".into()), 402),
            (AppError::UpstreamUnknown { status: 503, message: "x".into() }, 500),
            (AppError::Internal("x".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(err.status_code().as_u16(), code, "{err:?}");
        }
    }

    #[tokio::test]
    async fn test_quota_body() {
        let resp = AppError::QuotaExceeded { limit: 3, current: 3 }.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Daily message limit reached");
        assert_eq!(body["limit"], 3);
        assert_eq!(body["current"], 3);
        assert_eq!(body["upgradeMessage"], UPGRADE_MESSAGE);
    }

    #[tokio::test]
    async fn test_burst_sets_retry_after() {
        let resp = AppError::TooManyRequests { retry_after_secs: 7 }.into_response();
        assert_eq!(resp.headers()[header::RETRY_AFTER], "7");
    }

    #[tokio::test]
    async fn test_upstream_detail_is_hidden() {
        let err: AppError = crate::engine::provider::GenerationError::Other {
            status: Some(502),
            message: r#"{"error":"internal key sk-live-123 exhausted at provider-x"}"#.into(),
        }
        .into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "AI service error");
        assert_eq!(body["kind"], "upstream_unknown");
        assert!(!body.to_string().contains("sk-live-123"));
        assert!(!body.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_storage_detail_is_hidden() {
        let err = AppError::Database(rusqlite::Error::QueryReturnedNoRows);
        let body = body_json(err.into_response()).await;
        assert_eq!(body["error"], "Storage is temporarily unavailable");
        assert_eq!(body["kind"], "database");
    }
}
