//! Credential redaction for structured log fields.
//!
//! Keys are matched case-insensitively. Values are also inspected so that a
//! bearer header or JWT logged under an innocent key still never reaches disk.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Replacement written in place of a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: [&str; 5] = ["token", "apikey", "api_key", "cookie", "authorization"];

const DENYLIST_FRAGMENTS: [&str; 4] = ["secret", "password", "private_key", "credential"];

const MAX_VALUE_LEN: usize = 512;

/// Redact every field of a log entry in place.
pub fn redact_fields(fields: &mut HashMap<String, Value>) {
    for (key, value) in fields.iter_mut() {
        *value = redact_value(key, value);
    }
}

/// Return a copy of `value` with sensitive content replaced.
pub fn redact_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) => redact_string(s),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), redact_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_value(key, item))
                .collect::<Vec<_>>(),
        ),
        _ => value.clone(),
    }
}

fn redact_string(raw: &str) -> Value {
    if looks_like_sensitive_value(raw) {
        return Value::String(REDACTED.to_string());
    }
    if raw.len() > MAX_VALUE_LEN {
        return Value::String(format!("[TRUNCATED:{}]", sha256_prefixed(raw)));
    }
    Value::String(raw.to_string())
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower == *entry)
        || DENYLIST_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
        || lower.ends_with("_token")
}

fn looks_like_sensitive_value(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("bearer ") {
        return true;
    }
    // Three dot-separated segments: JWT shaped.
    if raw.matches('.').count() == 2 && raw.len() > 40 && !raw.contains(' ') {
        return true;
    }
    is_long_hex(raw) || is_long_base64(raw)
}

fn is_long_hex(value: &str) -> bool {
    value.len() > 48 && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_long_base64(value: &str) -> bool {
    value.len() > 48
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' || c == '_' || c == '-')
}

fn sha256_prefixed(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    format!("sha256:{}", hex::encode(&digest[..8]))
}
