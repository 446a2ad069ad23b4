//! relay-rs: Authenticated HTTP to SMTP mail relay
//!
//! A small HTTP service that accepts authenticated requests to send email
//! (optionally with one file attachment), forwards them to an SMTP provider,
//! and exposes status/config endpoints.
//!
//! # Features
//!
//! - **Send pipeline**: validation, sanitization, attachment gating, external
//!   malware scanning, SMTP dispatch
//! - **Security**: API-key auth, CSRF tokens, per-IP rate limiting, CORS
//! - **Diagnostic mode**: file-sink transport with preview links for
//!   non-production use
//!
//! # Example
//!
//! ```no_run
//! use relay_rs::api::ApiServer;
//! use relay_rs::config::Config;
//! use relay_rs::dispatch::Mailer;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::from_env()?);
//!     let mailer = Arc::new(Mailer::new(&config));
//!
//!     let server = ApiServer::new(config, mailer, None);
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`validate`]: Request validation and sanitization
//! - [`attachment`]: Attachment spooling and admission gate
//! - [`scanner`]: External malware scanning
//! - [`dispatch`]: Outbound mail dispatch
//! - [`security`]: API key, CSRF and rate limiting middleware
//! - [`api`]: HTTP server and handlers

pub mod api;
pub mod attachment;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod scanner;
pub mod security;
pub mod validate;

// Re-export commonly used types
pub use config::Config;
pub use error::{RelayError, Result};
