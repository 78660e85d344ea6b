// src/error.rs
// Standardized error types for margin

use thiserror::Error;

/// Main error type for the margin library
#[derive(Error, Debug)]
pub enum MarginError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no API key configured")]
    MissingApiKey,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream error: {0}")]
    Stream(String),
}

/// Convenience type alias for Result using MarginError
pub type Result<T> = std::result::Result<T, MarginError>;

impl MarginError {
    /// Short user-facing detail, used for `error: <detail>` status lines
    pub fn to_user_string(&self) -> String {
        match self {
            MarginError::Api { status, .. } => format!("API error {}", status),
            other => other.to_string(),
        }
    }

    /// True for failures of the remote transport (network, HTTP status, broken stream)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            MarginError::Api { .. } | MarginError::Http(_) | MarginError::Stream(_)
        )
    }
}
