//! Storage trait definitions.

use crate::StorageResult;
use async_trait::async_trait;

/// Async key-value contract for the on-device cache tier.
///
/// Values are opaque strings. Every call may suspend on I/O; callers treat
/// errors as a miss on reads and as ignorable on writes and deletes.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Retrieve a value
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Returns whether a value was present.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
