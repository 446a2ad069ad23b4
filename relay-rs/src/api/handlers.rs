//! API request handlers

use axum::{
    extract::{Json as JsonExtractor, Multipart, Request, State},
    extract::FromRequest,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::attachment::SpooledAttachment;
use crate::config::{Config, SmtpSettings};
use crate::dispatch::{Mailer, TransportMode};
use crate::error::{RelayError, Result};
use crate::scanner::{ScanVerdict, Scanner};
use crate::security::RateLimiter;
use crate::security::csrf;
use crate::validate::{validate, SendFields};

/// Shared application state
pub struct AppState {
    pub config: Arc<Config>,
    pub mailer: Arc<Mailer>,
    pub scanner: Option<Arc<dyn Scanner>>,
    pub api_limiter: RateLimiter,
    pub send_limiter: RateLimiter,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
            message: None,
        }
    }

    pub fn with_message(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: Some(message.to_string()),
        }
    }
}

/// Map a pipeline error to an HTTP response. Server-side detail is exposed
/// only in diagnostic mode.
fn error_response(state: &AppState, err: RelayError) -> Response {
    let diagnostic = state.mailer.mode() == TransportMode::Diagnostic;

    let (status, body) = match &err {
        RelayError::Validation(reason) => (
            StatusCode::BAD_REQUEST,
            ApiError::with_message("Validation failed", reason),
        ),
        RelayError::AttachmentRejected(reason) => (
            StatusCode::BAD_REQUEST,
            ApiError::with_message("Attachment rejected", reason),
        ),
        RelayError::InvalidEmail(_) => (
            StatusCode::BAD_REQUEST,
            ApiError::new("Invalid email address"),
        ),
        RelayError::Config(reason) => (
            StatusCode::BAD_REQUEST,
            ApiError::with_message("Configuration rejected", reason),
        ),
        RelayError::Unauthorized(reason) => (
            StatusCode::UNAUTHORIZED,
            ApiError::with_message("Unauthorized", reason),
        ),
        RelayError::Csrf(reason) => (
            StatusCode::FORBIDDEN,
            ApiError::with_message("Invalid CSRF token", reason),
        ),
        RelayError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            ApiError::new("Too many requests, please try again later"),
        ),
        RelayError::ScanQuotaExceeded => (
            StatusCode::TOO_MANY_REQUESTS,
            ApiError::new("Scanning quota exceeded, please try again later"),
        ),
        RelayError::ScanTimedOut => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("Malware scan did not complete in time"),
        ),
        RelayError::Scan(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            if diagnostic {
                ApiError::with_message("Malware scan failed", reason)
            } else {
                ApiError::new("Malware scan failed")
            },
        ),
        _ => {
            error!("Request failed: {}", err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                if diagnostic {
                    ApiError::with_message("Internal server error", &err.to_string())
                } else {
                    ApiError::new("Internal server error")
                },
            )
        }
    };

    (status, Json(body)).into_response()
}

/// GET / - Welcome message
pub async fn welcome() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to the mail relay API" }))
}

/// GET /health - Unauthenticated liveness probe
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/csrf-token - Issue a CSRF token (cookie + body)
pub async fn csrf_token(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let token = csrf::generate_token();
    let secure = state.mailer.mode() == TransportMode::Real;
    let cookie = csrf::issue_cookie(&token, secure);

    (
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "token": token })),
    )
}

/// POST /api/mail/send - Validate, gate, scan and dispatch one message
pub async fn send_mail(State(state): State<Arc<AppState>>, req: Request) -> Response {
    match send_pipeline(&state, req).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => error_response(&state, err),
    }
}

/// The send pipeline: payload extraction, attachment gate, malware scan,
/// field validation, final gate (inside the dispatcher), dispatch.
///
/// The spooled attachment is owned by this function; its guard removes the
/// file on every return path.
async fn send_pipeline(state: &AppState, req: Request) -> Result<crate::dispatch::DispatchResult> {
    let (fields, attachment) = extract_payload(state, req).await?;

    if let Some(att) = &attachment {
        att.admit()?;

        if let Some(scanner) = &state.scanner {
            let bytes = att.read().await?;
            match scanner.scan(att.original_name(), bytes).await {
                ScanVerdict::Clean => {}
                ScanVerdict::Malicious => {
                    warn!("Attachment {} flagged as malicious", att.original_name());
                    return Err(RelayError::AttachmentRejected(
                        "malware detected in attachment".to_string(),
                    ));
                }
                ScanVerdict::QuotaExceeded => {
                    notify_quota_exhaustion(state).await;
                    return Err(RelayError::ScanQuotaExceeded);
                }
                ScanVerdict::TimedOut => return Err(RelayError::ScanTimedOut),
                ScanVerdict::Error(reason) => return Err(RelayError::Scan(reason)),
            }
        }
    }

    let request = validate(&fields)?;
    let result = state.mailer.send(&request, attachment.as_ref()).await?;

    info!(
        "Mail relayed: {} -> {} ({})",
        request.sender, request.recipient, result.message_id
    );
    Ok(result)
}

/// Alert the operator that the scanning quota is exhausted. Best effort:
/// failure is logged and never fails the original request.
async fn notify_quota_exhaustion(state: &AppState) {
    let Some(recipient) = &state.config.scanner.alert_recipient else {
        warn!("Scan quota exceeded and no alert recipient configured");
        return;
    };

    let body = format!(
        "The malware scanning quota was exhausted at {}. \
         Attachment sends are rejected with 429 until the quota resets.",
        chrono::Utc::now().to_rfc3339()
    );
    if let Err(e) = state
        .mailer
        .send_alert(recipient, "Malware scan quota exceeded", &body)
        .await
    {
        warn!("Failed to deliver quota alert to {}: {}", recipient, e);
    }
}

/// Extract send fields and the optional attachment from a JSON or multipart
/// request body.
async fn extract_payload(
    state: &AppState,
    req: Request,
) -> Result<(SendFields, Option<SpooledAttachment>)> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| RelayError::Validation(format!("invalid multipart body: {}", e)))?;

        let mut fields = SendFields::default();
        let mut attachment = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| RelayError::Validation(format!("invalid multipart field: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "from" => fields.from = Some(read_text_field(field).await?),
                "to" => fields.to = Some(read_text_field(field).await?),
                "subject" => fields.subject = Some(read_text_field(field).await?),
                "text" => fields.text = Some(read_text_field(field).await?),
                "file" => {
                    let file_name = field.file_name().unwrap_or("attachment").to_string();
                    let mime = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let bytes = field.bytes().await.map_err(|e| {
                        RelayError::Validation(format!("failed to read upload: {}", e))
                    })?;
                    attachment = Some(
                        SpooledAttachment::spool(
                            Path::new(&state.config.server.upload_dir),
                            &file_name,
                            &mime,
                            &bytes,
                        )
                        .await?,
                    );
                }
                _ => {}
            }
        }

        Ok((fields, attachment))
    } else {
        let JsonExtractor(fields) = JsonExtractor::<SendFields>::from_request(req, &())
            .await
            .map_err(|e| RelayError::Validation(format!("invalid JSON body: {}", e)))?;
        Ok((fields, None))
    }
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| RelayError::Validation(format!("invalid form field: {}", e)))
}

/// GET /api/mail/status - Transport reachability
pub async fn mail_status(State(state): State<Arc<AppState>>) -> Response {
    match state.mailer.verify().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "operational",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "mode": state.mailer.mode().to_string(),
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Transport verification failed: {}", e);
            let diagnostic = state.mailer.mode() == TransportMode::Diagnostic;
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": "Mail transport is not responding",
                    "detail": if diagnostic { Some(e.to_string()) } else { None },
                })),
            )
                .into_response()
        }
    }
}

/// GET /api/mail/config - Non-secret transport parameters
pub async fn mail_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.mailer.info().await)
}

/// PUT /api/mail/config - Verified atomic transport update
pub async fn update_mail_config(
    State(state): State<Arc<AppState>>,
    Json(candidate): Json<SmtpSettings>,
) -> Response {
    match state.mailer.update_config(candidate).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "success": true })),
        )
            .into_response(),
        Err(err @ RelayError::Config(_)) => error_response(&state, err),
        Err(err) => {
            error!("Transport update failed: {}", err);
            let diagnostic = state.mailer.mode() == TransportMode::Diagnostic;
            let body = if diagnostic {
                ApiError::with_message("Transport update failed", &err.to_string())
            } else {
                ApiError::new("Transport update failed")
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
