//! API Server - HTTP server for the relay REST API

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, ApiError, AppState};
use crate::attachment::MAX_ATTACHMENT_BYTES;
use crate::config::Config;
use crate::dispatch::Mailer;
use crate::scanner::Scanner;
use crate::security::rate_limit::RateLimitClass;
use crate::security::{api_key, client_ip, csrf, RateLimiter};

/// Body limit for the send route: the 5 MiB attachment cap plus headroom
/// for multipart framing and the scalar fields.
const SEND_BODY_LIMIT: usize = MAX_ATTACHMENT_BYTES as usize + 64 * 1024;

/// API server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: Arc<Config>, mailer: Arc<Mailer>, scanner: Option<Arc<dyn Scanner>>) -> Self {
        let addr = config.server.listen_addr.clone();
        let state = Arc::new(AppState {
            config,
            mailer,
            scanner,
            api_limiter: RateLimiter::new(RateLimitClass::Api),
            send_limiter: RateLimiter::new(RateLimitClass::Send),
        });

        Self { state, addr }
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Build the router with all routes and security layers
    pub fn router(&self) -> Router {
        let cors = build_cors(&self.state.config);

        // Public routes (no auth, no rate limit)
        let public_routes = Router::new()
            .route("/", get(handlers::welcome))
            .route("/health", get(handlers::health));

        // Token issuance: rate limited but reachable without an API key
        let token_routes = Router::new()
            .route("/api/csrf-token", get(handlers::csrf_token))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                api_rate_limit,
            ));

        // Send route carries its own stricter limiter
        let send_routes = Router::new()
            .route("/api/mail/send", post(handlers::send_mail))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                send_rate_limit,
            ))
            .layer(DefaultBodyLimit::max(SEND_BODY_LIMIT));

        // Protected routes: rate limit -> API key -> CSRF (outermost first)
        let protected_routes = Router::new()
            .route("/api/mail/status", get(handlers::mail_status))
            .route(
                "/api/mail/config",
                get(handlers::mail_config).put(handlers::update_mail_config),
            )
            .merge(send_routes)
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                csrf::verify_csrf,
            ))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                api_key::require_api_key,
            ))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                api_rate_limit,
            ));

        Router::new()
            .merge(public_routes)
            .merge(token_routes)
            .merge(protected_routes)
            .layer(middleware::from_fn(security_headers))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}

fn build_cors(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                HeaderName::from_static("x-api-key"),
                HeaderName::from_static("x-csrf-token"),
            ])
            .allow_credentials(true)
    }
}

/// General per-IP limit on `/api` traffic
async fn api_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    if !state.api_limiter.check(&ip).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError::new("Too many requests from this IP, please try again later")),
        )
            .into_response();
    }
    next.run(req).await
}

/// Stricter per-IP limit on the send endpoint
async fn send_rate_limit(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    if !state.send_limiter.check(&ip).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError::new("Too many send requests, please try again later")),
        )
            .into_response();
    }
    next.run(req).await
}

/// Baseline security response headers
async fn security_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    response
}
