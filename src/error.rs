//! Error types for bidi-har

use std::time::Duration;
use thiserror::Error;

/// Result type for bidi-har operations
pub type Result<T> = std::result::Result<T, HarError>;

/// Errors that can occur while recording or exporting a HAR
#[derive(Debug, Error)]
pub enum HarError {
    /// Missing or invalid construction options
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation not valid for the current session state
    #[error("Invalid state: {0}")]
    State(String),

    /// Malformed event passed to the recorder
    #[error("Invalid event: {0}")]
    Validation(String),

    /// A queued task did not settle before its deadline
    #[error("Task timeout after {0:?}")]
    Timeout(Duration),

    /// A queued task failed, panicked or was dropped
    #[error("Task failed: {0}")]
    Task(String),

    /// The remote end answered a command with an error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transport failure (socket closed, channel gone)
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarError {
    /// Check if this error is a task timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
