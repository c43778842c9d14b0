//! Error types
//!
//! `BridgeError` is the library-level error for everything below the CLI.
//! Binary-edge code (config loading, bootstrap) uses `anyhow` instead.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Phone number is required")]
    MissingPhoneNumber,

    #[error("Phone number must contain only digits (no +, (), or -)")]
    InvalidPhoneNumber(String),

    #[error("Not connected to WhatsApp. Please connect first.")]
    NotConnected,

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Cloud API returned {status}: {body}")]
    CloudApi { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Pairing failed: {0}")]
    Pairing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Stable machine-readable code for logs and API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingPhoneNumber => "MISSING_PHONE_NUMBER",
            Self::InvalidPhoneNumber(_) => "INVALID_PHONE_NUMBER",
            Self::NotConnected => "NOT_CONNECTED",
            Self::NotConfigured(_) => "NOT_CONFIGURED",
            Self::Payload(_) => "INVALID_PAYLOAD",
            Self::CloudApi { .. } => "CLOUD_API_ERROR",
            Self::Http(_) => "HTTP_ERROR",
            Self::Pairing(_) => "PAIRING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the caller sent something unusable (as opposed to a server-side failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingPhoneNumber
                | Self::InvalidPhoneNumber(_)
                | Self::NotConnected
                | Self::Payload(_)
        )
    }
}
