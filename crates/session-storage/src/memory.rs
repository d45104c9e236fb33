//! Process-local cache.

use crate::{LocalCache, StorageResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory [`LocalCache`]. Lost on restart; useful on platforms without a
/// writable data directory and as a stand-in for tests.
#[derive(Default)]
pub struct MemoryCache {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

#[async_trait]
impl LocalCache for MemoryCache {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::new();

        cache.set("test_key", "test_value").await.unwrap();
        assert_eq!(
            cache.get("test_key").await.unwrap(),
            Some("test_value".to_string())
        );

        assert!(cache.has("test_key").await.unwrap());
        assert!(!cache.has("nonexistent").await.unwrap());

        assert!(cache.delete("test_key").await.unwrap());
        assert!(!cache.delete("test_key").await.unwrap());
        assert_eq!(cache.get("test_key").await.unwrap(), None);
        assert!(cache.is_empty());
    }
}
