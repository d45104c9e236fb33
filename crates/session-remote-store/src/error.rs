//! Remote store error types.

use thiserror::Error;

/// Remote store error type.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status
    #[error("Remote store rejected request: {status} ({body_summary})")]
    Status { status: u16, body_summary: String },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Empty or otherwise unusable user id
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Network unavailable (transient error, can retry)
    #[error("Network unavailable")]
    NetworkUnavailable,
}

impl RemoteError {
    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable
    /// - Timeouts
    /// - 5xx and 429 responses
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::NetworkUnavailable => true,
            RemoteError::Timeout => true,
            RemoteError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            RemoteError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Result type alias using RemoteError.
pub type RemoteResult<T> = Result<T, RemoteError>;
