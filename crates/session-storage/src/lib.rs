//! On-device storage for session credentials.
//!
//! This crate provides:
//! - [`TokenRecord`], the unit of persisted session state, and its validity rule
//! - [`LocalCache`], the async key-value contract for the on-device tier
//! - [`MemoryCache`] and [`FileCache`] implementations
//! - [`DeviceIdentity`], the lazily created per-install device id

mod device;
mod file;
mod keys;
mod memory;
mod record;
mod traits;

pub use device::DeviceIdentity;
pub use file::FileCache;
pub use keys::StorageKeys;
pub use memory::MemoryCache;
pub use record::{StoredEntry, TokenRecord, EXPIRY_WARNING_WINDOW_MS};
pub use traits::LocalCache;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure (lock, task, platform store)
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Key not found
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
