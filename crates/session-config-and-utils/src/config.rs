//! Configuration for the session subsystem.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default remote store URL (can be overridden at compile time via TOKENKEEPER_REMOTE_URL env var).
pub const DEFAULT_REMOTE_URL: &str = match option_env!("TOKENKEEPER_REMOTE_URL") {
    Some(url) => url,
    None => "https://random.supabase.co",
};

/// Default remote store publishable key (can be overridden at compile time via TOKENKEEPER_REMOTE_KEY env var).
pub const DEFAULT_REMOTE_PUBLISHABLE_KEY: &str = match option_env!("TOKENKEEPER_REMOTE_KEY") {
    Some(key) => key,
    None => "random-key",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Table holding one token row per user.
pub const DEFAULT_REMOTE_TABLE: &str = "session_tokens";
/// Upper bound for a single remote store call.
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 4_000;
/// Settle window for identity provider notifications.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 200;
/// Notifications closer than this to the previous commit count toward the burst.
pub const DEFAULT_BURST_WINDOW_MS: u64 = 500;
/// Burst size above which notifications are dropped.
pub const DEFAULT_MAX_BURST: u32 = 5;

/// How `load` resolves two valid durable records for the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The first valid durable hit wins (remote before local).
    #[default]
    RemoteWins,
    /// The record with the highest `last_refresh` wins.
    NewestRefreshWins,
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Remote token store URL.
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    /// Remote store publishable API key (public, safe to expose).
    #[serde(default = "default_remote_publishable_key")]
    pub remote_publishable_key: String,
    /// Table (or collection) holding token rows.
    #[serde(default = "default_remote_table")]
    pub remote_table: String,
    /// Timeout applied to every durable tier call, in milliseconds.
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,
    /// Settle window for the auth event bridge, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Loop guard window measured from the last commit, in milliseconds.
    #[serde(default = "default_burst_window_ms")]
    pub burst_window_ms: u64,
    /// Maximum notifications admitted inside the loop guard window.
    #[serde(default = "default_max_burst")]
    pub max_burst: u32,
    /// Conflict policy for valid records in more than one durable tier.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}

fn default_remote_publishable_key() -> String {
    DEFAULT_REMOTE_PUBLISHABLE_KEY.to_string()
}

fn default_remote_table() -> String {
    DEFAULT_REMOTE_TABLE.to_string()
}

fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_burst_window_ms() -> u64 {
    DEFAULT_BURST_WINDOW_MS
}

fn default_max_burst() -> u32 {
    DEFAULT_MAX_BURST
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            remote_publishable_key: DEFAULT_REMOTE_PUBLISHABLE_KEY.to_string(),
            remote_table: DEFAULT_REMOTE_TABLE.to_string(),
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            burst_window_ms: DEFAULT_BURST_WINDOW_MS,
            max_burst: DEFAULT_MAX_BURST,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from a file, falling back to defaults.
    /// Note: remote_url and remote_publishable_key are compile-time only
    /// and always use the built-in defaults, regardless of the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.remote_url = DEFAULT_REMOTE_URL.to_string();
        config.remote_publishable_key = DEFAULT_REMOTE_PUBLISHABLE_KEY.to_string();

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Reject values that would disable the timeout or the loop guard.
    pub fn validate(&self) -> CoreResult<()> {
        if self.remote_timeout_ms == 0 {
            return Err(CoreError::Config(
                "remote_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_burst == 0 {
            return Err(CoreError::Config(
                "max_burst must be greater than zero".to_string(),
            ));
        }
        if self.remote_table.trim().is_empty() {
            return Err(CoreError::Config("remote_table must not be empty".to_string()));
        }
        Ok(())
    }

    /// Runtime overrides. Only the log level and the remote timeout can be
    /// changed from the environment.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("TOKENKEEPER_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(timeout) = std::env::var("TOKENKEEPER_REMOTE_TIMEOUT_MS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            self.remote_timeout_ms = timeout;
        }
    }

    /// Get the remote store URL as a parsed URL.
    pub fn remote_url(&self) -> CoreResult<Url> {
        Url::parse(&self.remote_url).map_err(CoreError::from)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_millis(self.burst_window_ms)
    }
}
