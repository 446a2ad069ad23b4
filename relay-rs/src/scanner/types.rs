/// Outcome of a malware scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    /// Completed report with zero malicious detections.
    Clean,
    /// Completed report with at least one malicious detection.
    Malicious,
    /// The scanning service rejected the request for quota/rate reasons.
    QuotaExceeded,
    /// No completed report within the polling budget.
    TimedOut,
    /// Transport-level or protocol failure.
    Error(String),
}

impl ScanVerdict {
    /// Whether this verdict permits the attachment to be sent.
    pub fn permits_send(&self) -> bool {
        matches!(self, ScanVerdict::Clean)
    }
}
