//! Storage key constants.

/// Keys used in the on-device cache.
pub struct StorageKeys;

impl StorageKeys {
    /// Current session tokens (JSON [`crate::StoredEntry`])
    pub const SESSION_TOKENS: &'static str = "session_tokens";

    /// Per-install device id
    pub const DEVICE_ID: &'static str = "device_id";
}
