//! Error types for rill-client

use thiserror::Error;

/// Result type alias using rill-client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the chat service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed to start or the connection faulted
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Service returned a non-success response
    #[error("API error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body stream faulted mid-read
    #[error("Stream read error: {0}")]
    StreamRead(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Durable session-identity storage is unavailable
    #[error("Identity storage unavailable: {0}")]
    IdentityStorage(String),

    /// Upload was rejected by the service
    #[error("Upload of '{filename}' rejected: status {status}: {message}")]
    UploadRejected {
        filename: String,
        status: u16,
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create an API error from a status code and body text
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Whether degraded operation can continue after this error
    pub fn is_degraded_only(&self) -> bool {
        matches!(self, Error::IdentityStorage(_))
    }
}
