//! VirusTotal v3 API client
//!
//! Upload flow: `POST {base}/files` (multipart) returns an analysis id,
//! `GET {base}/analyses/{id}` is polled until the report status is
//! `completed` or the attempt budget runs out.

use super::{ScanVerdict, Scanner};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 10;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct VirusTotalClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    max_poll_attempts: u32,
    poll_interval: Duration,
}

/// Upload response envelope
#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadData,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    id: String,
}

/// Analysis report envelope
#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    data: AnalysisData,
}

#[derive(Debug, Deserialize)]
struct AnalysisData {
    attributes: AnalysisAttributes,
}

#[derive(Debug, Deserialize)]
struct AnalysisAttributes {
    status: String,
    #[serde(default)]
    stats: AnalysisStats,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisStats {
    #[serde(default)]
    malicious: u32,
}

impl VirusTotalClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            client: reqwest::Client::new(),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_polling(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.max_poll_attempts = max_attempts;
        self.poll_interval = interval;
        self
    }

    /// Upload the file and return the analysis id.
    async fn submit(&self, filename: &str, bytes: Vec<u8>) -> Result<String, ScanVerdict> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .header("x-apikey", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ScanVerdict::Error(format!("upload failed: {}", e)))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("Scan upload rejected: quota exceeded");
            return Err(ScanVerdict::QuotaExceeded);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScanVerdict::Error(format!(
                "upload failed with status {}: {}",
                status, body
            )));
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| ScanVerdict::Error(format!("invalid upload response: {}", e)))?;

        debug!("Scan submitted, analysis id {}", upload.data.id);
        Ok(upload.data.id)
    }

    /// Fetch the analysis report once. `Ok(None)` means not yet completed.
    async fn poll_once(&self, analysis_id: &str) -> Result<Option<AnalysisAttributes>, ScanVerdict> {
        let response = self
            .client
            .get(format!("{}/analyses/{}", self.base_url, analysis_id))
            .header("x-apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| ScanVerdict::Error(format!("poll failed: {}", e)))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!("Scan poll rejected: quota exceeded");
            return Err(ScanVerdict::QuotaExceeded);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(ScanVerdict::Error(format!(
                "poll failed with status {}",
                status
            )));
        }

        let analysis: AnalysisResponse = response
            .json()
            .await
            .map_err(|e| ScanVerdict::Error(format!("invalid analysis response: {}", e)))?;

        if analysis.data.attributes.status == "completed" {
            Ok(Some(analysis.data.attributes))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl Scanner for VirusTotalClient {
    async fn scan(&self, filename: &str, bytes: Vec<u8>) -> ScanVerdict {
        info!("Scanning attachment {} ({} bytes)", filename, bytes.len());

        let analysis_id = match self.submit(filename, bytes).await {
            Ok(id) => id,
            Err(verdict) => return verdict,
        };

        for attempt in 1..=self.max_poll_attempts {
            tokio::time::sleep(self.poll_interval).await;

            match self.poll_once(&analysis_id).await {
                Ok(Some(report)) => {
                    debug!(
                        "Analysis {} completed on attempt {}: {} malicious",
                        analysis_id, attempt, report.stats.malicious
                    );
                    return if report.stats.malicious > 0 {
                        ScanVerdict::Malicious
                    } else {
                        ScanVerdict::Clean
                    };
                }
                Ok(None) => debug!("Analysis {} pending (attempt {})", analysis_id, attempt),
                Err(verdict) => return verdict,
            }
        }

        warn!(
            "Analysis {} not completed after {} attempts",
            analysis_id, self.max_poll_attempts
        );
        ScanVerdict::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_parsing() {
        let json = r#"{"data": {"id": "NjY0MjRlOTFh", "type": "analysis"}}"#;
        let parsed: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.id, "NjY0MjRlOTFh");
    }

    #[test]
    fn test_analysis_response_parsing() {
        let json = r#"{
            "data": {
                "attributes": {
                    "status": "completed",
                    "stats": {"malicious": 2, "harmless": 60, "undetected": 10}
                }
            }
        }"#;
        let parsed: AnalysisResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.attributes.status, "completed");
        assert_eq!(parsed.data.attributes.stats.malicious, 2);
    }

    #[test]
    fn test_pending_analysis_has_default_stats() {
        let json = r#"{"data": {"attributes": {"status": "queued"}}}"#;
        let parsed: AnalysisResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data.attributes.status, "queued");
        assert_eq!(parsed.data.attributes.stats.malicious, 0);
    }

    #[test]
    fn test_client_polling_override() {
        let client = VirusTotalClient::new(
            "https://www.virustotal.com/api/v3".to_string(),
            "key".to_string(),
        )
        .with_polling(3, Duration::from_millis(10));
        assert_eq!(client.max_poll_attempts, 3);
        assert_eq!(client.poll_interval, Duration::from_millis(10));
    }
}
