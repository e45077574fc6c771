//! Error types for WoT HTTP device operations.

use thiserror::Error;

/// Result type for WoT device operations.
pub type WotResult<T> = Result<T, WotError>;

/// Error type for WoT device operations.
#[derive(Debug, Error)]
pub enum WotError {
    /// Network, DNS or timeout failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Device answered with a 4xx/5xx status
    #[error("HTTP error {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Invalid JSON or unexpected document shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Input rejected by a derived schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown device, action or property
    #[error("Not found: {0}")]
    NotFound(String),

    /// A whole polling cycle failed
    #[error("Update failed: {0}")]
    UpdateFailed(String),

    /// Other error
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl WotError {
    /// Whether the error happened before the device answered at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<serde_json::Error> for WotError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
