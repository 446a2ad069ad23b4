use serde::Serialize;

/// Transport mode, fixed at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Real,
    Diagnostic,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Real => write!(f, "real"),
            TransportMode::Diagnostic => write!(f, "diagnostic"),
        }
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub message_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

/// Non-secret transport parameters, safe to expose over the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportInfo {
    pub mode: TransportMode,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub sender: String,
}
