//! Stable per-install device identifier.

use crate::{LocalCache, MemoryCache, StorageKeys};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use uuid::Uuid;

/// Lazily resolved device id.
///
/// The first call reads `StorageKeys::DEVICE_ID` from the local cache and
/// generates and stores a fresh UUID if none exists. The value is then
/// memoized for the life of the process; concurrent first callers share one
/// resolution.
pub struct DeviceIdentity {
    cache: Arc<dyn LocalCache>,
    id: OnceCell<String>,
}

impl DeviceIdentity {
    pub fn new(cache: Arc<dyn LocalCache>) -> Self {
        Self {
            cache,
            id: OnceCell::new(),
        }
    }

    /// A device identity with a known id that never touches storage.
    pub fn fixed(id: impl Into<String>) -> Self {
        Self {
            cache: Arc::new(MemoryCache::new()),
            id: OnceCell::new_with(Some(id.into())),
        }
    }

    /// Get the device id, creating it on first use.
    pub async fn device_id(&self) -> String {
        self.id.get_or_init(|| self.resolve()).await.clone()
    }

    async fn resolve(&self) -> String {
        match self.cache.get(StorageKeys::DEVICE_ID).await {
            Ok(Some(id)) if !id.trim().is_empty() => id,
            Ok(_) => {
                let id = Uuid::new_v4().to_string();
                if let Err(e) = self.cache.set(StorageKeys::DEVICE_ID, &id).await {
                    warn!(error = %e, "failed to persist new device id");
                }
                info!(device_id = %id, "generated device id");
                id
            }
            Err(e) => {
                // Unreadable cache: use an id for this process only, and do
                // not overwrite whatever the cache may still hold.
                let id = Uuid::new_v4().to_string();
                warn!(error = %e, device_id = %id, "device id unavailable, using ephemeral id");
                id
            }
        }
    }
}
