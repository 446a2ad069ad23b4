//! External malware scanning
//!
//! Attachments are submitted to an external scanning service before they are
//! eligible for sending. The service is reached over HTTP: one upload call
//! returns an analysis id, then the report is polled a bounded number of
//! times with a fixed delay (10 attempts, 2 s apart).
//!
//! Verdict policy:
//! - `Malicious` and `TimedOut` both block the send. A file that could not
//!   be scanned within the attempt budget is never forwarded.
//! - `QuotaExceeded` blocks the send and additionally triggers a single
//!   best-effort operator alert through the dispatcher.
//! - `Error` blocks the send and surfaces as a server error.
//!
//! The [`Scanner`] trait is the seam: handlers depend on it, tests substitute
//! stub verdicts, and [`VirusTotalClient`] is the production implementation.

mod types;
mod virustotal;

pub use types::ScanVerdict;
pub use virustotal::VirusTotalClient;

use async_trait::async_trait;

/// A malware scanning backend.
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Submit file bytes and wait (bounded) for a verdict.
    ///
    /// Never returns an error: every failure mode is folded into a
    /// [`ScanVerdict`] variant so callers handle exactly one outcome type.
    async fn scan(&self, filename: &str, bytes: Vec<u8>) -> ScanVerdict;
}
