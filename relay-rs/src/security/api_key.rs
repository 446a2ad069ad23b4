//! API key authentication middleware
//!
//! Requests to protected routes must carry the configured key in the
//! `x-api-key` header. When no key is configured, enforcement is disabled.

use crate::api::handlers::{ApiError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::warn;

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // CORS preflight never carries credentials
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let expected = match &state.config.security.api_key {
        Some(key) => key,
        None => return next.run(req).await,
    };

    match req.headers().get("x-api-key").and_then(|h| h.to_str().ok()) {
        Some(provided) if provided == expected => next.run(req).await,
        Some(_) => {
            warn!("Rejected request with invalid API key");
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new("Invalid API key")),
            )
                .into_response()
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(ApiError::new(
                "No API key provided. Include your key in the x-api-key header.",
            )),
        )
            .into_response(),
    }
}
