//! Session token records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Records expiring within this window are logged as about to expire.
pub const EXPIRY_WARNING_WINDOW_MS: i64 = 60_000;

/// The unit of persisted session state.
///
/// All timestamps are epoch milliseconds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Short-lived bearer credential.
    pub id_token: String,
    /// Secondary bearer credential, empty when the provider issues none.
    #[serde(default)]
    pub access_token: String,
    /// Long-lived credential used to mint new bearer tokens.
    pub refresh_token: String,
    /// Absolute expiry of `id_token`.
    pub token_expiry: i64,
    /// Last successful refresh or save.
    pub last_refresh: i64,
}

impl TokenRecord {
    /// Both required credentials are present.
    pub fn is_well_formed(&self) -> bool {
        !self.id_token.is_empty() && !self.refresh_token.is_empty()
    }

    /// A record is usable iff it is well formed and `now < token_expiry`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.is_well_formed() && now_ms < self.token_expiry
    }

    /// Milliseconds until expiry, negative once expired.
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.token_expiry.saturating_sub(now_ms)
    }

    /// True if the record expires within `window_ms` of `now_ms`.
    pub fn expires_within(&self, now_ms: i64, window_ms: i64) -> bool {
        self.remaining_ms(now_ms) <= window_ms
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("id_token", &redact(&self.id_token))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("token_expiry", &self.token_expiry)
            .field("last_refresh", &self.last_refresh)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        "<empty>"
    } else {
        "[REDACTED]"
    }
}

/// A token record together with the user it belongs to, as persisted in
/// the on-device cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub user_id: String,
    pub record: TokenRecord,
}

impl StoredEntry {
    pub fn new(user_id: impl Into<String>, record: TokenRecord) -> Self {
        Self {
            user_id: user_id.into(),
            record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;

    fn record(expiry: i64) -> TokenRecord {
        TokenRecord {
            id_token: "t1".to_string(),
            access_token: "a1".to_string(),
            refresh_token: "r1".to_string(),
            token_expiry: expiry,
            last_refresh: NOW,
        }
    }

    #[test]
    fn test_valid_before_expiry() {
        assert!(record(NOW + 3_600_000).is_valid_at(NOW));
    }

    #[test]
    fn test_invalid_at_and_after_expiry() {
        assert!(!record(NOW).is_valid_at(NOW));
        assert!(!record(NOW - 1).is_valid_at(NOW));
    }

    #[test]
    fn test_missing_credentials_are_invalid() {
        let mut r = record(NOW + 3_600_000);
        r.id_token.clear();
        assert!(!r.is_valid_at(NOW));

        let mut r = record(NOW + 3_600_000);
        r.refresh_token.clear();
        assert!(!r.is_valid_at(NOW));
    }

    #[test]
    fn test_empty_access_token_is_allowed() {
        let mut r = record(NOW + 3_600_000);
        r.access_token.clear();
        assert!(r.is_valid_at(NOW));
    }

    #[test]
    fn test_expires_within_window() {
        let r = record(NOW + 30_000);
        assert!(r.expires_within(NOW, EXPIRY_WARNING_WINDOW_MS));
        assert!(!record(NOW + 3_600_000).expires_within(NOW, EXPIRY_WARNING_WINDOW_MS));
        assert_eq!(r.remaining_ms(NOW), 30_000);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let debug = format!("{:?}", record(NOW + 1));
        assert!(!debug.contains("t1"));
        assert!(!debug.contains("r1"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("token_expiry"));
    }

    #[test]
    fn test_missing_access_token_deserializes_empty() {
        let json = r#"{"id_token":"t","refresh_token":"r","token_expiry":5,"last_refresh":1}"#;
        let r: TokenRecord = serde_json::from_str(json).unwrap();
        assert!(r.access_token.is_empty());
        assert_eq!(r.token_expiry, 5);
    }
}
