//! File-backed on-device cache.
//!
//! The whole cache is one small JSON object. Writes go to a temp file in the
//! same directory followed by a rename, so a crash mid-write leaves either the
//! old or the new contents on disk, never a torn file.

use crate::{LocalCache, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type Entries = BTreeMap<String, String>;

/// [`LocalCache`] persisted as a JSON map on disk.
pub struct FileCache {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> StorageResult<Entries> {
        let path = self.path.clone();
        run_blocking(move || read_entries(&path)).await
    }

    /// Read for modification. A corrupt file is replaced rather than
    /// wedging every later write.
    async fn read_for_update(&self) -> StorageResult<Entries> {
        match self.read().await {
            Err(StorageError::Encoding(reason)) => {
                warn!(
                    path = %self.path.display(),
                    reason = %reason,
                    "local cache file is corrupt, starting fresh"
                );
                Ok(Entries::new())
            }
            other => other,
        }
    }

    async fn write(&self, entries: Entries) -> StorageResult<()> {
        let path = self.path.clone();
        run_blocking(move || {
            let content = serde_json::to_string_pretty(&entries)?;
            atomic_write_text(&path, &content)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LocalCache for FileCache {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        Ok(entries.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_for_update().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write(entries).await?;
        debug!(key = %key, path = %self.path.display(), "local cache entry written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_for_update().await?;
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.write(entries).await?;
        Ok(true)
    }
}

async fn run_blocking<T, F>(f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StorageResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Backend(format!("blocking task failed: {e}")))?
}

fn read_entries(path: &Path) -> StorageResult<Entries> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn atomic_write_text(path: &Path, content: &str) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent"))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no file name"))?;

    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(
        ".{}.tokenkeeper.tmp.{}",
        file_name,
        std::time::SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    let write_result = (|| -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, path)?;

        if let Ok(parent_dir) = fs::File::open(dir) {
            let _ = parent_dir.sync_all();
        }
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache.json"));

        assert_eq!(cache.get("session_tokens").await.unwrap(), None);
        assert!(!cache.delete("session_tokens").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_get_delete_persist_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let cache = FileCache::new(&path);
        cache.set("device_id", "dev-1").await.unwrap();
        cache.set("session_tokens", "{}").await.unwrap();

        let reopened = FileCache::new(&path);
        assert_eq!(
            reopened.get("device_id").await.unwrap(),
            Some("dev-1".to_string())
        );

        assert!(reopened.delete("session_tokens").await.unwrap());
        assert_eq!(cache.get("session_tokens").await.unwrap(), None);
        assert_eq!(cache.get("device_id").await.unwrap(), Some("dev-1".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_read_error_and_is_replaced_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();

        let cache = FileCache::new(&path);
        assert!(matches!(
            cache.get("device_id").await,
            Err(StorageError::Encoding(_))
        ));

        cache.set("device_id", "dev-2").await.unwrap();
        assert_eq!(cache.get("device_id").await.unwrap(), Some("dev-2".to_string()));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache.json"));
        cache.set("a", "1").await.unwrap();
        cache.set("b", "2").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["cache.json".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cache_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        FileCache::new(&path).set("a", "1").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
