//! Session error types.

use session_remote_store::RemoteError;
use session_storage::StorageError;
use thiserror::Error;

/// Session manager error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Empty user id passed to an operation that needs one
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    /// Token record missing required credentials
    #[error("Invalid token record: {0}")]
    InvalidRecord(String),

    /// The in-memory tier could not be read or updated
    #[error("In-memory token tier unavailable: {0}")]
    MemoryTier(String),

    /// Local cache error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote store error
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// A tier call exceeded its time budget
    #[error("Operation timed out")]
    Timeout,

    /// Invalid state transition in the bridge FSM
    #[error("Invalid bridge state transition: {0}")]
    InvalidStateTransition(String),
}

impl SessionError {
    /// Errors that break the in-process contract and must reach the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::MemoryTier(_))
    }

    /// Returns true if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Timeout => true,
            SessionError::Remote(e) => e.is_transient(),
            SessionError::Storage(StorageError::Io(_)) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Storage(StorageError::from(err))
    }
}

/// Result type alias using SessionError.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_memory_tier_is_fatal() {
        assert!(SessionError::MemoryTier("poisoned".to_string()).is_fatal());
        assert!(!SessionError::Timeout.is_fatal());
        assert!(!SessionError::InvalidUserId(String::new()).is_fatal());
    }

    #[test]
    fn test_transient_errors() {
        assert!(SessionError::Timeout.is_transient());
        assert!(SessionError::Remote(RemoteError::NetworkUnavailable).is_transient());
        assert!(!SessionError::InvalidRecord("x".to_string()).is_transient());
    }

    #[test]
    fn test_json_error_maps_to_storage_encoding() {
        let err: SessionError = serde_json::from_str::<u32>("x").unwrap_err().into();
        assert!(matches!(
            err,
            SessionError::Storage(StorageError::Encoding(_))
        ));
    }
}
