//! Attachment spooling and admission gate
//!
//! Uploaded files are spooled into the configured upload directory under a
//! random name and wrapped in [`SpooledAttachment`], an RAII guard that
//! removes the spool file when dropped. Every exit path of the send pipeline
//! (validation failure, scan rejection, transport failure, success) releases
//! the file through the same guard, so no attachment outlives its request.
//!
//! Admission runs twice in the full pipeline: once on upload receipt and once
//! immediately before the message is composed, since the scan step separates
//! the two checkpoints in time.

use crate::error::{RelayError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum accepted attachment size: 5 MiB.
pub const MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

/// File extensions eligible for sending.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// Declared MIME types eligible for sending.
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "image/png", "image/jpeg"];

/// An uploaded file spooled to disk for the duration of one request.
#[derive(Debug)]
pub struct SpooledAttachment {
    original_name: String,
    mime: String,
    path: PathBuf,
    size: u64,
}

impl SpooledAttachment {
    /// Write uploaded bytes into `upload_dir` under a unique spool name.
    pub async fn spool(
        upload_dir: &Path,
        original_name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<Self> {
        // Keep only the final path component of the client-supplied name.
        let original_name = Path::new(original_name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let spool_name = format!("{}-{}", uuid::Uuid::new_v4(), original_name);
        let path = upload_dir.join(spool_name);

        tokio::fs::create_dir_all(upload_dir).await?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Spooled attachment {} ({} bytes)", path.display(), bytes.len());

        Ok(Self {
            original_name,
            mime: mime.to_string(),
            path,
            size: bytes.len() as u64,
        })
    }

    /// Check this attachment against the allow-lists and size cap.
    ///
    /// Check order: extension, declared MIME type, size. The spool file
    /// itself is released by the guard as soon as the caller drops a
    /// rejected attachment.
    pub fn admit(&self) -> Result<()> {
        let extension = Path::new(&self.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(RelayError::AttachmentRejected(format!(
                "disallowed file extension: {:?}",
                extension
            )));
        }

        if !ALLOWED_MIME_TYPES.contains(&self.mime.as_str()) {
            return Err(RelayError::AttachmentRejected(format!(
                "disallowed content type: {}",
                self.mime
            )));
        }

        if self.size > MAX_ATTACHMENT_BYTES {
            return Err(RelayError::AttachmentRejected(format!(
                "file too large: {} bytes (max {})",
                self.size, MAX_ATTACHMENT_BYTES
            )));
        }

        Ok(())
    }

    /// Read the spooled bytes back for scanning or sending.
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.path).await?)
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SpooledAttachment {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove spool file {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn spool(dir: &Path, name: &str, mime: &str, bytes: &[u8]) -> SpooledAttachment {
        SpooledAttachment::spool(dir, name, mime, bytes).await.unwrap()
    }

    #[tokio::test]
    async fn test_admit_valid_pdf() {
        let dir = tempdir().unwrap();
        let att = spool(dir.path(), "report.pdf", "application/pdf", b"%PDF-1.4").await;
        assert!(att.admit().is_ok());
    }

    #[tokio::test]
    async fn test_reject_disallowed_extension_and_cleanup() {
        let dir = tempdir().unwrap();
        let att = spool(dir.path(), "script.exe", "application/pdf", b"MZ").await;
        let path = att.path().to_path_buf();

        assert!(matches!(att.admit(), Err(RelayError::AttachmentRejected(_))));
        assert!(path.exists());

        drop(att);
        assert!(!path.exists(), "spool file must be deleted on drop");
    }

    #[tokio::test]
    async fn test_reject_disallowed_mime() {
        let dir = tempdir().unwrap();
        let att = spool(dir.path(), "image.png", "text/html", b"<html>").await;
        assert!(matches!(att.admit(), Err(RelayError::AttachmentRejected(_))));
    }

    #[tokio::test]
    async fn test_reject_oversized_even_with_valid_extension() {
        let dir = tempdir().unwrap();
        let bytes = vec![0u8; (MAX_ATTACHMENT_BYTES + 1) as usize];
        let att = spool(dir.path(), "big.png", "image/png", &bytes).await;
        let path = att.path().to_path_buf();

        assert!(matches!(att.admit(), Err(RelayError::AttachmentRejected(_))));
        drop(att);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_extension_check_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let att = spool(dir.path(), "photo.JPG", "image/jpeg", b"\xff\xd8").await;
        assert!(att.admit().is_ok());
    }

    #[tokio::test]
    async fn test_path_traversal_names_are_flattened() {
        let dir = tempdir().unwrap();
        let att = spool(dir.path(), "../../etc/passwd.png", "image/png", b"x").await;
        assert_eq!(att.original_name(), "passwd.png");
        assert!(att.path().starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_repeated_rejections_leave_no_residue() {
        let dir = tempdir().unwrap();
        for _ in 0..2 {
            let att = spool(dir.path(), "evil.exe", "application/pdf", b"MZ").await;
            assert!(att.admit().is_err());
        }
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 0);
    }
}
