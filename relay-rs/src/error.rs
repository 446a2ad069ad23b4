use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Attachment rejected: {0}")]
    AttachmentRejected(String),

    #[error("Scan quota exceeded")]
    ScanQuotaExceeded,

    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Scan timed out before a verdict was available")]
    ScanTimedOut,

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("CSRF verification failed: {0}")]
    Csrf(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(#[from] lettre::address::AddressError),

    #[error("Message build error: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    SmtpTransport(#[from] lettre::transport::smtp::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
