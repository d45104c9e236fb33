//! PostgREST-backed remote token store.
//!
//! Rows live in a table keyed by `user_id`:
//!
//! | column | type |
//! |---|---|
//! | `user_id` | text, primary key |
//! | `id_token`, `access_token`, `refresh_token` | text |
//! | `token_expiry`, `last_refresh` | bigint (epoch millis) |
//! | `device_id` | text |
//! | `created_at` | timestamptz, default `now()` |
//! | `updated_at` | timestamptz, maintained by an update trigger |
//!
//! The server owns both timestamps; the client never sends them.

use crate::{RemoteError, RemoteResult, RemoteTokenRecord, RemoteTokenStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use session_config_and_utils::Config;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_TABLE: &str = "session_tokens";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Row shape sent on writes.
#[derive(Serialize)]
struct TokenRow<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    record: &'a RemoteTokenRecord,
}

/// Remote token store on top of the Supabase REST API.
#[derive(Clone)]
pub struct SupabaseTokenStore {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
    table: String,
    request_timeout: Duration,
    // Signed-in user's access token; falls back to the publishable key.
    access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseTokenStore {
    /// Create a new store client.
    ///
    /// # Arguments
    /// * `api_url` - The Supabase project API URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - The project's publishable API key
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        let api_url: String = api_url.into();
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            table: DEFAULT_TABLE.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    /// Use a different table for token rows.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Per-request timeout enforced by the HTTP client.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build a store from the configured project URL, key, table and timeout.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.remote_url, &config.remote_publishable_key)
            .with_table(&config.remote_table)
            .with_request_timeout(config.remote_timeout())
    }

    /// Set or clear the bearer token used for row-level security.
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    /// Build the REST API URL for the token table.
    fn rest_url(&self) -> RemoteResult<Url> {
        Ok(Url::parse(&format!("{}/rest/v1/{}", self.api_url, self.table))?)
    }

    fn row_url(&self, user_id: &str) -> RemoteResult<Url> {
        let mut url = self.rest_url()?;
        url.query_pairs_mut()
            .append_pair("user_id", &format!("eq.{user_id}"));
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.publishable_key.clone());

        self.http_client
            .request(method, url)
            .timeout(self.request_timeout)
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Accept", "application/json")
    }

    async fn check_status(
        response: reqwest::Response,
        action: &'static str,
    ) -> RemoteResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body_summary = summarize_response_body(&body);
        tracing::warn!(
            status = %status,
            body_summary = %body_summary,
            action,
            "Remote token store request failed"
        );
        Err(RemoteError::Status {
            status: status.as_u16(),
            body_summary,
        })
    }
}

fn ensure_user_id(user_id: &str) -> RemoteResult<()> {
    if user_id.trim().is_empty() {
        return Err(RemoteError::InvalidUserId(user_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl RemoteTokenStore for SupabaseTokenStore {
    async fn get(&self, user_id: &str) -> RemoteResult<Option<RemoteTokenRecord>> {
        ensure_user_id(user_id)?;
        let mut url = self.row_url(user_id)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("limit", "1");

        tracing::debug!(user_id = %user_id, "Fetching token row");

        let response = self.request(reqwest::Method::GET, url).send().await?;
        let response = Self::check_status(response, "get").await?;

        let rows: Vec<RemoteTokenRecord> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn set(
        &self,
        user_id: &str,
        record: &RemoteTokenRecord,
        merge: bool,
    ) -> RemoteResult<()> {
        ensure_user_id(user_id)?;
        let row = TokenRow { user_id, record };

        let builder = if merge {
            let mut url = self.rest_url()?;
            url.query_pairs_mut().append_pair("on_conflict", "user_id");
            self.request(reqwest::Method::POST, url)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
        } else {
            // PUT replaces the whole row addressed by the filter.
            self.request(reqwest::Method::PUT, self.row_url(user_id)?)
                .header("Prefer", "return=minimal")
        };

        let response = builder
            .header("Content-Type", "application/json")
            .json(&row)
            .send()
            .await?;
        Self::check_status(response, "set").await?;

        tracing::debug!(
            user_id = %user_id,
            device_id = %record.device_id,
            merge,
            "Token row written"
        );
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> RemoteResult<bool> {
        ensure_user_id(user_id)?;
        let url = self.row_url(user_id)?;

        let response = self
            .request(reqwest::Method::DELETE, url)
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let response = Self::check_status(response, "delete").await?;

        let deleted: Vec<serde_json::Value> = response.json().await?;
        tracing::debug!(user_id = %user_id, rows = deleted.len(), "Token row deleted");
        Ok(!deleted.is_empty())
    }
}
