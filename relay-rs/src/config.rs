//! Configuration management
//!
//! Configuration is read once at startup (environment variables first, with
//! an optional `config.toml` as the base layer) and then treated as an
//! immutable value shared behind `Arc`. Runtime transport changes go through
//! the dispatcher's `update_config`, never back into this struct.

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpSettings,
    pub security: SecurityConfig,
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Diagnostic mode routes mail to an inspectable file sink instead of a
    /// real SMTP relay. Fixed at process start.
    pub diagnostic_mode: bool,
    pub diagnostic_dir: String,
    pub upload_dir: String,
}

/// Outbound SMTP transport parameters plus the envelope sender address.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub sender: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// API key required in `x-api-key`. `None` disables key enforcement.
    pub api_key: Option<String>,
    pub csrf_enforce: bool,
    /// Allowed CORS origins. Empty means permissive.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: Option<String>,
    /// Operator address alerted when the scanning quota is exhausted.
    pub alert_recipient: Option<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| RelayError::Config(e.to_string()))
    }

    /// Build configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(addr) = std::env::var("RELAY_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }
        config.server.diagnostic_mode = env_flag("DIAGNOSTIC_MODE");
        if let Ok(dir) = std::env::var("DIAGNOSTIC_DIR") {
            config.server.diagnostic_dir = dir;
        }
        if let Ok(dir) = std::env::var("UPLOAD_DIR") {
            config.server.upload_dir = dir;
        }

        if let Ok(host) = std::env::var("SMTP_HOST") {
            config.smtp.host = host;
        }
        if let Ok(port) = std::env::var("SMTP_PORT") {
            config.smtp.port = port
                .parse()
                .map_err(|_| RelayError::Config(format!("invalid SMTP_PORT: {}", port)))?;
        }
        config.smtp.secure = env_flag("SMTP_SECURE");
        config.smtp.user = std::env::var("SMTP_USER").ok();
        config.smtp.pass = std::env::var("SMTP_PASS").ok();
        if let Ok(from) = std::env::var("SMTP_FROM") {
            config.smtp.sender = from;
        }

        config.security.api_key = std::env::var("API_KEY").ok().filter(|k| !k.is_empty());
        config.security.csrf_enforce = env_flag("CSRF_ENFORCE");
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            config.security.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        config.scanner.enabled = env_flag("SCAN_ENABLED");
        if let Ok(url) = std::env::var("SCAN_API_URL") {
            config.scanner.api_url = url;
        }
        config.scanner.api_key = std::env::var("SCAN_API_KEY").ok().filter(|k| !k.is_empty());
        config.scanner.alert_recipient = std::env::var("ALERT_RCPT").ok();

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:3000".to_string(),
                diagnostic_mode: false,
                diagnostic_dir: "/tmp/relay-rs-outbox".to_string(),
                upload_dir: "./uploads".to_string(),
            },
            smtp: SmtpSettings {
                host: "localhost".to_string(),
                port: 587,
                secure: false,
                user: None,
                pass: None,
                sender: "relay@localhost".to_string(),
            },
            security: SecurityConfig {
                api_key: None,
                csrf_enforce: false,
                allowed_origins: Vec::new(),
            },
            scanner: ScannerConfig {
                enabled: false,
                api_url: "https://www.virustotal.com/api/v3".to_string(),
                api_key: None,
                alert_recipient: None,
            },
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "true" || v == "1").unwrap_or(false)
}
