//! Security pipeline
//!
//! Cross-cutting middleware composed in front of the API routes:
//! API-key authentication, CSRF token issuance/verification, and per-IP
//! rate limiting. CORS and security response headers are layered on in
//! [`crate::api::server`].

pub mod api_key;
pub mod csrf;
pub mod rate_limit;

pub use rate_limit::RateLimiter;

use axum::extract::ConnectInfo;
use std::net::SocketAddr;

/// Best-effort client address for rate-limit keying.
///
/// Falls back to a fixed key when no connect info is attached (e.g. when the
/// router is exercised directly in tests).
pub fn client_ip<B>(req: &axum::http::Request<B>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
