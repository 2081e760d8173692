//! Error types for the file bridge
//!
//! Every failure a processing cycle can hit is a variant here, so the
//! runner can decide per kind whether it is local to one line, one
//! request, or the whole process.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Request file contents are not a JSON object
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Completion service unreachable or answered with a non-success status
    #[error("Connection to {endpoint} failed (status {}): {body}", status_text(.status))]
    ConnectionFailure {
        endpoint: String,
        status: Option<u16>,
        body: String,
    },

    /// Transport failed after the stream was opened
    #[error("Streaming error: {0}")]
    StreamingError(String),

    /// Stream stalled or request exceeded its deadline
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Response file could not be appended to
    #[error("Failed to write {}: {source}", .path.display())]
    PartialWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem watcher errors
    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic errors with context
    #[error("Bridge error: {0}")]
    Generic(String),
}

fn status_text(status: &Option<u16>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::Generic(err.to_string())
    }
}
