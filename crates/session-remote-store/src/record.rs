//! Remote token record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_storage::TokenRecord;

/// A [`TokenRecord`] as stored remotely, tagged with the writing device.
///
/// `created_at` and `updated_at` are assigned by the server and never sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTokenRecord {
    #[serde(flatten)]
    pub tokens: TokenRecord,
    pub device_id: String,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RemoteTokenRecord {
    pub fn new(tokens: TokenRecord, device_id: impl Into<String>) -> Self {
        Self {
            tokens,
            device_id: device_id.into(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn into_tokens(self) -> TokenRecord {
        self.tokens
    }
}
