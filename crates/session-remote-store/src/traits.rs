//! Remote store contract.

use crate::{RemoteResult, RemoteTokenRecord};
use async_trait::async_trait;

/// Durable per-user token storage reachable only when online.
///
/// Callers treat every error as a miss on reads and as best-effort on writes
/// and deletes; implementations should not retry internally.
#[async_trait]
pub trait RemoteTokenStore: Send + Sync {
    /// Fetch the record stored for `user_id`.
    async fn get(&self, user_id: &str) -> RemoteResult<Option<RemoteTokenRecord>>;

    /// Write the record for `user_id`. With `merge`, fields the record does
    /// not carry are preserved at the destination.
    async fn set(&self, user_id: &str, record: &RemoteTokenRecord, merge: bool)
        -> RemoteResult<()>;

    /// Delete the record for `user_id`. Returns whether one existed.
    async fn delete(&self, user_id: &str) -> RemoteResult<bool>;
}
