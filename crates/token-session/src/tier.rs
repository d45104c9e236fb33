//! Durable token tiers.
//!
//! The manager walks an ordered list of tiers behind one interface. Memory is
//! not a tier here; it is owned by the manager and never suspends.

use crate::{SessionError, SessionResult};
use async_trait::async_trait;
use session_remote_store::{RemoteTokenRecord, RemoteTokenStore};
use session_storage::{DeviceIdentity, LocalCache, StorageKeys, StoredEntry};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Identifies a tier in logs and in the manager's tier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Remote,
    Local,
    Custom(&'static str),
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Remote => "remote",
            TierKind::Local => "local",
            TierKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the manager issues writes to a tier during `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Awaited inline, failures logged.
    Awaited,
    /// Spawned; the caller gets a handle it may ignore.
    Detached,
}

/// A durable place to keep token records.
///
/// Every call is wrapped in the manager's I/O timeout, so implementations do
/// not need their own. Errors are treated as misses on reads and logged on
/// writes.
#[async_trait]
pub trait TokenTier: Send + Sync {
    fn kind(&self) -> TierKind;

    /// The tier is keyed by user and is skipped when no user is known.
    fn requires_user(&self) -> bool;

    fn write_mode(&self) -> WriteMode;

    async fn fetch(&self, user_id: Option<&str>) -> SessionResult<Option<StoredEntry>>;

    async fn store(&self, entry: &StoredEntry) -> SessionResult<()>;

    /// Remove the record. With `Some(user_id)` only that user's record is
    /// removed; with `None` whatever the tier holds is removed.
    async fn evict(&self, user_id: Option<&str>) -> SessionResult<()>;
}

/// On-device cache holding the single most recent entry.
pub struct LocalTier {
    cache: Arc<dyn LocalCache>,
}

impl LocalTier {
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self { cache }
    }

    async fn read_entry(&self) -> SessionResult<Option<StoredEntry>> {
        let Some(raw) = self.cache.get(StorageKeys::SESSION_TOKENS).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }
}

#[async_trait]
impl TokenTier for LocalTier {
    fn kind(&self) -> TierKind {
        TierKind::Local
    }

    fn requires_user(&self) -> bool {
        false
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Awaited
    }

    async fn fetch(&self, _user_id: Option<&str>) -> SessionResult<Option<StoredEntry>> {
        self.read_entry().await
    }

    async fn store(&self, entry: &StoredEntry) -> SessionResult<()> {
        let raw = serde_json::to_string(entry)?;
        self.cache.set(StorageKeys::SESSION_TOKENS, &raw).await?;
        Ok(())
    }

    async fn evict(&self, user_id: Option<&str>) -> SessionResult<()> {
        if let Some(user_id) = user_id {
            match self.read_entry().await {
                Ok(Some(entry)) if entry.user_id != user_id => {
                    debug!(user_id = %user_id, "local entry belongs to another user, keeping it");
                    return Ok(());
                }
                Ok(None) => return Ok(()),
                // Unreadable entries are removed along with matching ones.
                Ok(Some(_)) | Err(_) => {}
            }
        }
        self.cache.delete(StorageKeys::SESSION_TOKENS).await?;
        Ok(())
    }
}

/// Per-user rows in the remote store, tagged with this device's id.
pub struct RemoteTier {
    store: Arc<dyn RemoteTokenStore>,
    device: Arc<DeviceIdentity>,
}

impl RemoteTier {
    pub fn new(store: Arc<dyn RemoteTokenStore>, device: Arc<DeviceIdentity>) -> Self {
        Self { store, device }
    }
}

#[async_trait]
impl TokenTier for RemoteTier {
    fn kind(&self) -> TierKind {
        TierKind::Remote
    }

    fn requires_user(&self) -> bool {
        true
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Detached
    }

    async fn fetch(&self, user_id: Option<&str>) -> SessionResult<Option<StoredEntry>> {
        let Some(user_id) = user_id else {
            return Ok(None);
        };
        let row = self.store.get(user_id).await?;
        Ok(row.map(|row| StoredEntry::new(user_id, row.into_tokens())))
    }

    async fn store(&self, entry: &StoredEntry) -> SessionResult<()> {
        let device_id = self.device.device_id().await;
        let row = RemoteTokenRecord::new(entry.record.clone(), device_id);
        self.store.set(&entry.user_id, &row, true).await?;
        Ok(())
    }

    async fn evict(&self, user_id: Option<&str>) -> SessionResult<()> {
        match user_id {
            Some(user_id) => {
                let existed = self.store.delete(user_id).await?;
                debug!(user_id = %user_id, existed, "remote token row deleted");
                Ok(())
            }
            None => Err(SessionError::InvalidUserId(String::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_storage::{MemoryCache, TokenRecord};

    fn entry(user_id: &str) -> StoredEntry {
        StoredEntry::new(
            user_id,
            TokenRecord {
                id_token: "id".to_string(),
                access_token: String::new(),
                refresh_token: "refresh".to_string(),
                token_expiry: 10_000,
                last_refresh: 1_000,
            },
        )
    }

    #[tokio::test]
    async fn test_local_tier_round_trips_entry() {
        let cache = Arc::new(MemoryCache::new());
        let tier = LocalTier::new(cache.clone());

        assert!(tier.fetch(None).await.unwrap().is_none());
        tier.store(&entry("u1")).await.unwrap();
        assert_eq!(tier.fetch(Some("u2")).await.unwrap(), Some(entry("u1")));
        assert!(cache
            .get(StorageKeys::SESSION_TOKENS)
            .await
            .unwrap()
            .unwrap()
            .contains("\"user_id\":\"u1\""));
    }

    #[tokio::test]
    async fn test_local_tier_evict_keeps_other_users_entry() {
        let cache = Arc::new(MemoryCache::new());
        let tier = LocalTier::new(cache.clone());
        tier.store(&entry("u1")).await.unwrap();

        tier.evict(Some("u2")).await.unwrap();
        assert!(tier.fetch(None).await.unwrap().is_some());

        tier.evict(Some("u1")).await.unwrap();
        assert!(tier.fetch(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_tier_evict_all() {
        let cache = Arc::new(MemoryCache::new());
        let tier = LocalTier::new(cache.clone());
        tier.store(&entry("u1")).await.unwrap();

        tier.evict(None).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_local_tier_corrupt_entry_is_an_error() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(StorageKeys::SESSION_TOKENS, "{not json")
            .await
            .unwrap();
        let tier = LocalTier::new(cache.clone());

        assert!(tier.fetch(None).await.is_err());
        tier.evict(Some("u1")).await.unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tier_kind_display() {
        assert_eq!(TierKind::Remote.to_string(), "remote");
        assert_eq!(TierKind::Custom("keychain").to_string(), "keychain");
    }
}
