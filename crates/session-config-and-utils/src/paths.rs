//! File system locations used by the session subsystem.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

const BASE_DIR_NAME: &str = ".tokenkeeper";

/// On-disk layout, all relative to one base directory.
///
/// ```text
/// ~/.tokenkeeper/
///   config.json
///   local-cache.json
///   logs/session.jsonl
/// ```
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Rooted at `~/.tokenkeeper`.
    pub fn new() -> CoreResult<Self> {
        dirs::home_dir()
            .map(|home| Self::with_base_dir(home.join(BASE_DIR_NAME)))
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Backing file for `FileCache`.
    pub fn local_cache_file(&self) -> PathBuf {
        self.base_dir.join("local-cache.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("session.jsonl")
    }

    /// Create the base and log directories.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
