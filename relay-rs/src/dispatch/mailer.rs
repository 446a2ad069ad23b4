use crate::attachment::SpooledAttachment;
use crate::config::{Config, SmtpSettings};
use crate::dispatch::{DispatchResult, TransportInfo, TransportMode};
use crate::error::{RelayError, Result};
use crate::validate::SendRequest;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

enum TransportHandle {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File {
        transport: AsyncFileTransport<Tokio1Executor>,
        dir: PathBuf,
    },
}

/// Outbound mail dispatcher with an atomically swappable transport handle.
pub struct Mailer {
    mode: TransportMode,
    diagnostic_dir: PathBuf,
    settings: RwLock<SmtpSettings>,
    handle: RwLock<Option<Arc<TransportHandle>>>,
}

impl Mailer {
    pub fn new(config: &Config) -> Self {
        let mode = if config.server.diagnostic_mode {
            TransportMode::Diagnostic
        } else {
            TransportMode::Real
        };

        Self {
            mode,
            diagnostic_dir: PathBuf::from(&config.server.diagnostic_dir),
            settings: RwLock::new(config.smtp.clone()),
            handle: RwLock::new(None),
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Compose and submit a message, optionally with one attachment.
    ///
    /// The attachment passes the admission gate once more here (final
    /// control) since the scan step separates upload-time gating from send
    /// time.
    pub async fn send(
        &self,
        request: &SendRequest,
        attachment: Option<&SpooledAttachment>,
    ) -> Result<DispatchResult> {
        let message_id = format!(
            "{}.{}@relay-rs",
            uuid::Uuid::new_v4(),
            chrono::Utc::now().timestamp()
        );

        let builder = Message::builder()
            .from(Mailbox::new(None, request.sender.clone()))
            .to(Mailbox::new(None, request.recipient.clone()))
            .subject(request.subject.clone())
            .message_id(Some(format!("<{}>", message_id)))
            .date_now();

        let message = match attachment {
            Some(att) => {
                att.admit()?;
                let bytes = att.read().await?;
                let content_type = ContentType::parse(att.mime()).map_err(|e| {
                    RelayError::AttachmentRejected(format!(
                        "unparseable content type {}: {}",
                        att.mime(),
                        e
                    ))
                })?;
                let part = Attachment::new(att.original_name().to_string()).body(bytes, content_type);

                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(request.body.clone()))
                        .singlepart(part),
                )?
            }
            None => builder.singlepart(SinglePart::plain(request.body.clone()))?,
        };

        let handle = self.transport().await?;
        let result = self.submit(&handle, message, &message_id).await;
        if result.is_err() {
            // Drop the cached handle so the next send re-initializes lazily.
            self.invalidate().await;
        } else {
            info!("Dispatched message {} to {}", message_id, request.recipient);
        }
        result
    }

    /// Best-effort out-of-band notification (quota alerts). Uses the same
    /// transport as regular sends.
    pub async fn send_alert(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        let sender = self.settings.read().await.sender.clone();
        let message = Message::builder()
            .from(Mailbox::new(None, sender.parse::<Address>()?))
            .to(Mailbox::new(None, recipient.parse::<Address>()?))
            .subject(subject)
            .date_now()
            .singlepart(SinglePart::plain(body.to_string()))?;

        let handle = self.transport().await?;
        self.submit(&handle, message, "alert").await?;
        Ok(())
    }

    /// Verify that the current transport is reachable.
    pub async fn verify(&self) -> Result<()> {
        let handle = self.transport().await?;
        match handle.as_ref() {
            TransportHandle::Smtp(transport) => {
                let reachable = transport.test_connection().await.map_err(|e| {
                    RelayError::Dispatch(format!("transport verification failed: {}", e))
                })?;
                if reachable {
                    Ok(())
                } else {
                    self.invalidate().await;
                    Err(RelayError::Dispatch("SMTP server is not responding".to_string()))
                }
            }
            TransportHandle::File { dir, .. } => {
                tokio::fs::create_dir_all(dir).await?;
                Ok(())
            }
        }
    }

    /// Non-secret transport parameters. Credentials are never exposed.
    pub async fn info(&self) -> TransportInfo {
        let settings = self.settings.read().await;
        TransportInfo {
            mode: self.mode,
            host: settings.host.clone(),
            port: settings.port,
            secure: settings.secure,
            sender: settings.sender.clone(),
        }
    }

    /// Replace the SMTP configuration after verifying the candidate.
    ///
    /// Rejected outright in diagnostic mode. The swap is atomic: settings
    /// and handle are replaced together, and sends already in flight keep
    /// the handle they started with.
    pub async fn update_config(&self, candidate: SmtpSettings) -> Result<()> {
        if self.mode == TransportMode::Diagnostic {
            return Err(RelayError::Config(
                "transport configuration cannot be updated in diagnostic mode".to_string(),
            ));
        }

        let transport = build_smtp_transport(&candidate)?;
        let reachable = transport.test_connection().await.map_err(|e| {
            RelayError::Dispatch(format!("candidate transport unreachable: {}", e))
        })?;
        if !reachable {
            return Err(RelayError::Dispatch(
                "candidate transport failed verification".to_string(),
            ));
        }

        // Lock order: handle before settings, same as lazy initialization.
        let mut handle = self.handle.write().await;
        let mut settings = self.settings.write().await;
        *settings = candidate;
        *handle = Some(Arc::new(TransportHandle::Smtp(transport)));
        info!("Transport configuration updated ({}:{})", settings.host, settings.port);
        Ok(())
    }

    /// Get the current transport handle, initializing it on first use.
    async fn transport(&self) -> Result<Arc<TransportHandle>> {
        if let Some(handle) = self.handle.read().await.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let mut slot = self.handle.write().await;
        // Another request may have initialized while we waited for the lock.
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let handle = match self.mode {
            TransportMode::Real => {
                let settings = self.settings.read().await;
                debug!(
                    "Initializing SMTP transport {}:{} (secure: {})",
                    settings.host, settings.port, settings.secure
                );
                Arc::new(TransportHandle::Smtp(build_smtp_transport(&settings)?))
            }
            TransportMode::Diagnostic => {
                std::fs::create_dir_all(&self.diagnostic_dir)?;
                debug!(
                    "Initializing diagnostic file transport at {}",
                    self.diagnostic_dir.display()
                );
                Arc::new(TransportHandle::File {
                    transport: AsyncFileTransport::new(&self.diagnostic_dir),
                    dir: self.diagnostic_dir.clone(),
                })
            }
        };

        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    async fn submit(
        &self,
        handle: &TransportHandle,
        message: Message,
        message_id: &str,
    ) -> Result<DispatchResult> {
        match handle {
            TransportHandle::Smtp(transport) => {
                transport.send(message).await?;
                Ok(DispatchResult {
                    message_id: message_id.to_string(),
                    success: true,
                    preview_url: None,
                })
            }
            TransportHandle::File { transport, dir } => {
                let file_id = transport
                    .send(message)
                    .await
                    .map_err(|e| RelayError::Dispatch(format!("file transport error: {}", e)))?;
                let preview = format!("file://{}", dir.join(format!("{}.eml", file_id)).display());
                Ok(DispatchResult {
                    message_id: message_id.to_string(),
                    success: true,
                    preview_url: Some(preview),
                })
            }
        }
    }

    async fn invalidate(&self) {
        warn!("Invalidating transport handle after failure");
        *self.handle.write().await = None;
    }
}

fn build_smtp_transport(settings: &SmtpSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let mut builder = if settings.secure {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
    };

    builder = builder.port(settings.port);

    if let (Some(user), Some(pass)) = (&settings.user, &settings.pass) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{validate, SendFields};
    use tempfile::tempdir;

    fn diagnostic_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.server.diagnostic_mode = true;
        config.server.diagnostic_dir = dir.to_string_lossy().to_string();
        config
    }

    fn request() -> SendRequest {
        validate(&SendFields {
            from: Some("a@x.com".to_string()),
            to: Some("b@y.com".to_string()),
            subject: Some("Hello there".to_string()),
            text: Some("1234567890".to_string()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_diagnostic_send_writes_eml_with_preview() {
        let dir = tempdir().unwrap();
        let mailer = Mailer::new(&diagnostic_config(dir.path()));

        let result = mailer.send(&request(), None).await.unwrap();
        assert!(result.success);
        assert!(!result.message_id.is_empty());

        let preview = result.preview_url.expect("diagnostic mode must expose a preview");
        assert!(preview.starts_with("file://"));

        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn test_diagnostic_send_with_attachment() {
        let dir = tempdir().unwrap();
        let spool = tempdir().unwrap();
        let mailer = Mailer::new(&diagnostic_config(dir.path()));

        let att = SpooledAttachment::spool(spool.path(), "doc.pdf", "application/pdf", b"%PDF-1.4")
            .await
            .unwrap();
        let result = mailer.send(&request(), Some(&att)).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_final_gate_blocks_disallowed_attachment() {
        let dir = tempdir().unwrap();
        let spool = tempdir().unwrap();
        let mailer = Mailer::new(&diagnostic_config(dir.path()));

        let att = SpooledAttachment::spool(spool.path(), "evil.exe", "application/pdf", b"MZ")
            .await
            .unwrap();
        let err = mailer.send(&request(), Some(&att)).await.unwrap_err();
        assert!(matches!(err, RelayError::AttachmentRejected(_)));

        // Nothing must reach the sink
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_update_config_rejected_in_diagnostic_mode() {
        let dir = tempdir().unwrap();
        let mailer = Mailer::new(&diagnostic_config(dir.path()));
        let before = mailer.info().await;

        let err = mailer
            .update_config(Config::default().smtp)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));

        // Transport parameters unchanged
        let after = mailer.info().await;
        assert_eq!(after.host, before.host);
        assert_eq!(after.port, before.port);
    }

    #[tokio::test]
    async fn test_verify_in_diagnostic_mode() {
        let dir = tempdir().unwrap();
        let mailer = Mailer::new(&diagnostic_config(dir.path()));
        assert!(mailer.verify().await.is_ok());
    }

    #[tokio::test]
    async fn test_info_never_exposes_credentials() {
        let dir = tempdir().unwrap();
        let mut config = diagnostic_config(dir.path());
        config.smtp.user = Some("user".to_string());
        config.smtp.pass = Some("hunter2".to_string());
        let mailer = Mailer::new(&config);

        let info = mailer.info().await;
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("pass"));
    }
}
