//! Shared test harness: a relay wired for diagnostic mode with temp
//! directories and an optional stub scanner.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use relay_rs::api::ApiServer;
use relay_rs::config::Config;
use relay_rs::dispatch::Mailer;
use relay_rs::scanner::{ScanVerdict, Scanner};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// Scanner stub returning a fixed verdict.
pub struct StubScanner {
    verdict: ScanVerdict,
}

impl StubScanner {
    pub fn new(verdict: ScanVerdict) -> Self {
        Self { verdict }
    }
}

#[async_trait]
impl Scanner for StubScanner {
    async fn scan(&self, _filename: &str, _bytes: Vec<u8>) -> ScanVerdict {
        self.verdict.clone()
    }
}

pub struct TestRelay {
    pub router: Router,
    pub outbox: TempDir,
    pub uploads: TempDir,
}

impl TestRelay {
    pub fn new(configure: impl FnOnce(&mut Config), scanner: Option<Arc<dyn Scanner>>) -> Self {
        let outbox = TempDir::new().unwrap();
        let uploads = TempDir::new().unwrap();

        let mut config = Config::default();
        config.server.diagnostic_mode = true;
        config.server.diagnostic_dir = outbox.path().to_string_lossy().to_string();
        config.server.upload_dir = uploads.path().to_string_lossy().to_string();
        configure(&mut config);

        let config = Arc::new(config);
        let mailer = Arc::new(Mailer::new(&config));
        let router = ApiServer::new(config, mailer, scanner).router();

        Self {
            router,
            outbox,
            uploads,
        }
    }

    pub fn plain() -> Self {
        Self::new(|_| {}, None)
    }

    pub async fn request(&self, req: Request<Body>) -> Response<axum::body::Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    /// Messages written to the diagnostic sink so far.
    pub fn outbox_count(&self) -> usize {
        std::fs::read_dir(self.outbox.path()).unwrap().count()
    }

    /// Spool files still present in the upload directory.
    pub fn upload_residue(&self) -> usize {
        std::fs::read_dir(self.uploads.path()).unwrap().count()
    }
}

pub fn json_send_request(from: &str, to: &str, subject: &str, text: &str) -> Request<Body> {
    let body = serde_json::json!({
        "from": from,
        "to": to,
        "subject": subject,
        "text": text,
    });
    Request::builder()
        .method("POST")
        .uri("/api/mail/send")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Build a multipart/form-data body with the standard send fields and an
/// optional file part.
pub fn multipart_send_request(
    subject: &str,
    file: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in [
        ("from", "a@x.com"),
        ("to", "b@y.com"),
        ("subject", subject),
        ("text", "1234567890"),
    ] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, mime, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/mail/send")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: Response<axum::body::Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
