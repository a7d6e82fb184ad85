//! Error types for the Threads client.

use thiserror::Error;

/// Result type for Threads client operations.
pub type Result<T> = std::result::Result<T, ThreadsError>;

/// Threads client errors.
#[derive(Debug, Error)]
pub enum ThreadsError {
    /// Network error (connection failed, timeout, body read failure)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from the Graph API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// 2xx response that did not carry an object id
    #[error("received empty ID in response")]
    EmptyId,

    /// Unexpected response body
    #[error("parse error: {0}")]
    Parse(String),
}
