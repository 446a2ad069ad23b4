//! CSRF token issuance and verification
//!
//! Tokens are 32 bytes of entropy, hex-encoded, delivered both as an
//! `XSRF-TOKEN` cookie and in the response body. Verification is stateless:
//! mutating `/api` requests must present a well-formed token via the
//! `x-csrf-token` header or the cookie. The cookie is the delivery channel,
//! not a session binding.

use crate::api::handlers::{ApiError, AppState};
use axum::{
    body::Body,
    extract::State,
    http::{header::COOKIE, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rand::RngCore;
use std::sync::Arc;
use tracing::warn;

pub const TOKEN_BYTES: usize = 32;
pub const COOKIE_NAME: &str = "XSRF-TOKEN";
pub const HEADER_NAME: &str = "x-csrf-token";

/// Generate a fresh token: 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Stateless format check: at least 64 hex characters.
pub fn token_is_well_formed(token: &str) -> bool {
    token.len() >= TOKEN_BYTES * 2 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Build the Set-Cookie value for a freshly issued token.
pub fn issue_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age=86400",
        COOKIE_NAME, token
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Extract a named cookie from the Cookie header, if present.
fn cookie_value<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    let header = req.headers().get(COOKIE)?.to_str().ok()?;
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}

/// Verification middleware for mutating `/api` requests.
pub async fn verify_csrf(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.security.csrf_enforce {
        return next.run(req).await;
    }

    // Safe methods are exempt; the token endpoint itself is on a GET route.
    let method = req.method();
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(HEADER_NAME)
        .and_then(|h| h.to_str().ok())
        .or_else(|| cookie_value(&req, COOKIE_NAME));

    match token {
        Some(token) if token_is_well_formed(token) => next.run(req).await,
        _ => {
            warn!("Rejected request with missing or malformed CSRF token");
            (
                StatusCode::FORBIDDEN,
                Json(ApiError::with_message(
                    "Invalid CSRF token",
                    "Request failed security validation. Fetch a fresh token and retry.",
                )),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_format() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token_is_well_formed(&token));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(!token_is_well_formed(""));
        assert!(!token_is_well_formed("short"));
        assert!(!token_is_well_formed(&"z".repeat(64)));
        assert!(token_is_well_formed(&"a".repeat(64)));
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = issue_cookie("abc", false);
        assert!(cookie.starts_with("XSRF-TOKEN=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(!cookie.contains("Secure"));

        assert!(issue_cookie("abc", true).contains("Secure"));
    }
}
