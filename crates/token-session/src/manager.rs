//! Token session manager.
//!
//! Reads go memory, then each durable tier in order, stopping at the first
//! valid record. Writes go memory first, then fan out to the durable tiers.
//! Only a memory failure is reported to the caller; durable tiers are best
//! effort and logged.

use crate::clock::{Clock, SystemClock};
use crate::state::{SessionAction, SessionStore};
use crate::tier::{LocalTier, RemoteTier, TierKind, TokenTier, WriteMode};
use crate::{SessionError, SessionResult};
use futures_util::future::join_all;
use session_config_and_utils::{ConflictPolicy, Config, DEFAULT_REMOTE_TIMEOUT_MS};
use session_remote_store::RemoteTokenStore;
use session_storage::{
    DeviceIdentity, LocalCache, StoredEntry, TokenRecord, EXPIRY_WARNING_WINDOW_MS,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Manager tuning.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on every durable tier call.
    pub io_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_millis(DEFAULT_REMOTE_TIMEOUT_MS),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl From<&Config> for ManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            io_timeout: config.remote_timeout(),
            conflict_policy: config.conflict_policy,
        }
    }
}

/// Handle to the detached remote write issued by `save`.
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct RemoteWrite {
    handle: Option<JoinHandle<bool>>,
}

impl RemoteWrite {
    fn none() -> Self {
        Self { handle: None }
    }

    /// True while the write is still running.
    pub fn is_pending(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the write. Returns `true` if it landed or there was nothing
    /// to write, `false` on failure, timeout or cancellation.
    pub async fn wait(self) -> bool {
        match self.handle {
            Some(handle) => handle.await.unwrap_or(false),
            None => true,
        }
    }
}

struct Resolution {
    record: Option<TokenRecord>,
    consulted_durable: bool,
}

/// Owns the session token lifecycle for the app.
pub struct TokenSessionManager {
    memory: Mutex<Option<StoredEntry>>,
    store: SessionStore,
    tiers: Vec<Arc<dyn TokenTier>>,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
    pending_writes: Mutex<HashMap<(TierKind, String), AbortHandle>>,
}

impl TokenSessionManager {
    /// A manager with no durable tiers. Add them with the `with_*` builders.
    pub fn new(store: SessionStore, config: ManagerConfig) -> Self {
        Self {
            memory: Mutex::new(None),
            store,
            tiers: Vec::new(),
            clock: Arc::new(SystemClock),
            config,
            pending_writes: Mutex::new(HashMap::new()),
        }
    }

    /// Add the remote tier. It is always consulted before any other tier.
    pub fn with_remote_store(
        mut self,
        remote: Arc<dyn RemoteTokenStore>,
        device: Arc<DeviceIdentity>,
    ) -> Self {
        self.tiers.insert(0, Arc::new(RemoteTier::new(remote, device)));
        self
    }

    pub fn with_local_cache(mut self, cache: Arc<dyn LocalCache>) -> Self {
        self.tiers.push(Arc::new(LocalTier::new(cache)));
        self
    }

    /// Append a custom tier after the ones already configured.
    pub fn with_tier(mut self, tier: Arc<dyn TokenTier>) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn tier_order(&self) -> Vec<TierKind> {
        self.tiers.iter().map(|tier| tier.kind()).collect()
    }

    /// Save a token record for `user_id`.
    ///
    /// Memory and the state store are updated before this returns. The
    /// remote write is issued in the background; await the returned handle to
    /// observe its outcome. The local mirror is awaited but its failure is
    /// only logged.
    pub async fn save(&self, user_id: &str, record: TokenRecord) -> SessionResult<RemoteWrite> {
        if user_id.trim().is_empty() {
            return Err(SessionError::InvalidUserId(user_id.to_string()));
        }
        if !record.is_well_formed() {
            return Err(SessionError::InvalidRecord(
                "id_token and refresh_token are required".to_string(),
            ));
        }

        let now = self.clock.now_millis();
        if !record.is_valid_at(now) {
            warn!(
                user_id = %user_id,
                token_expiry = record.token_expiry,
                "saving token record that is already expired"
            );
        } else if record.expires_within(now, EXPIRY_WARNING_WINDOW_MS) {
            debug!(
                user_id = %user_id,
                remaining_ms = record.remaining_ms(now),
                "saving token record that is about to expire"
            );
        }

        let entry = StoredEntry::new(user_id, record);
        *self.memory()? = Some(entry.clone());
        self.publish(&entry);

        let mut remote_write = RemoteWrite::none();
        for tier in &self.tiers {
            match tier.write_mode() {
                WriteMode::Detached => {
                    remote_write = self.spawn_write(tier.clone(), entry.clone());
                }
                WriteMode::Awaited => {
                    if let Err(e) = self.bounded(tier.store(&entry)).await {
                        warn!(tier = %tier.kind(), user_id = %user_id, error = %e, "write-through failed");
                    }
                }
            }
        }

        debug!(user_id = %user_id, "token record saved");
        Ok(remote_write)
    }

    /// Resolve the current token record.
    ///
    /// With `user_id`, only that user's record is returned and the remote
    /// tier is consulted. Without it, memory and the local cache are checked
    /// for whatever session they hold.
    pub async fn load(&self, user_id: Option<&str>) -> SessionResult<Option<TokenRecord>> {
        let user_id = user_id.filter(|id| !id.trim().is_empty());

        self.store.dispatch(SessionAction::ResolutionStarted);
        let result = self.resolve(user_id).await;
        let restored = matches!(&result, Ok(resolution) if resolution.consulted_durable);
        self.store
            .dispatch(SessionAction::ResolutionFinished { restored });

        let resolution = result?;
        if resolution.record.is_none() {
            self.clear_stale_state(user_id);
        }
        Ok(resolution.record)
    }

    /// Drop every trace of the session. Durable clears are best effort and
    /// run concurrently. Safe to call repeatedly.
    pub async fn clear_all(&self, user_id: Option<&str>) -> SessionResult<()> {
        let user_id = user_id.filter(|id| !id.trim().is_empty());

        self.store.dispatch(SessionAction::TokensCleared);
        let memory = self.memory().map(|mut slot| {
            slot.take();
        });
        self.abort_pending_writes(user_id);

        let clears = self
            .tiers
            .iter()
            .filter(|tier| !tier.requires_user() || user_id.is_some())
            .map(|tier| async move {
                let scope = if tier.requires_user() { user_id } else { None };
                (tier.kind(), self.bounded(tier.evict(scope)).await)
            });
        for (kind, result) in join_all(clears).await {
            if let Err(e) = result {
                warn!(tier = %kind, error = %e, "failed to clear tier");
            }
        }

        info!(user_id = ?user_id, "session tokens cleared");
        memory
    }

    /// Whether usable tokens exist. Never fails; errors count as `false`.
    pub async fn has_valid_tokens(&self, user_id: Option<&str>) -> bool {
        let now = self.clock.now_millis();
        if self
            .store
            .read(|state| state.has_valid_tokens_at(now, user_id))
        {
            return true;
        }
        match self.load(user_id).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(error = %e, "token check failed");
                false
            }
        }
    }

    async fn resolve(&self, user_id: Option<&str>) -> SessionResult<Resolution> {
        let now = self.clock.now_millis();

        let cached = self.memory()?.clone();
        if let Some(entry) = cached {
            let owned = user_id.map_or(true, |id| id == entry.user_id);
            if owned && entry.record.is_valid_at(now) {
                self.publish(&entry);
                return Ok(Resolution {
                    record: Some(entry.record),
                    consulted_durable: false,
                });
            }
            if owned {
                debug!(user_id = %entry.user_id, "memory token record expired");
                let mut slot = self.memory()?;
                if slot.as_ref() == Some(&entry) {
                    slot.take();
                }
            }
        }

        let mut consulted_durable = false;
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.requires_user() && user_id.is_none() {
                continue;
            }
            consulted_durable = true;

            let Some(entry) = self.fetch_valid(tier.as_ref(), user_id, now).await else {
                continue;
            };

            let (winner, source) = self.apply_conflict_policy(index, entry, user_id, now).await;
            *self.memory()? = Some(winner.clone());
            self.publish(&winner);
            self.back_fill(index, source, &winner).await;

            info!(
                tier = %self.tiers[source].kind(),
                user_id = %winner.user_id,
                "token record restored"
            );
            return Ok(Resolution {
                record: Some(winner.record),
                consulted_durable,
            });
        }

        Ok(Resolution {
            record: None,
            consulted_durable,
        })
    }

    /// Read one tier. Failures, foreign records and expired records are all
    /// misses; expired records are evicted from that tier.
    async fn fetch_valid(
        &self,
        tier: &dyn TokenTier,
        user_id: Option<&str>,
        now: i64,
    ) -> Option<StoredEntry> {
        let entry = match self.bounded(tier.fetch(user_id)).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(tier = %tier.kind(), "token tier miss");
                return None;
            }
            Err(e) => {
                warn!(tier = %tier.kind(), error = %e, "token tier read failed");
                return None;
            }
        };

        if user_id.is_some_and(|id| id != entry.user_id) {
            debug!(tier = %tier.kind(), "token tier holds another user's record");
            return None;
        }

        if !entry.record.is_valid_at(now) {
            info!(
                tier = %tier.kind(),
                user_id = %entry.user_id,
                token_expiry = entry.record.token_expiry,
                "evicting expired token record"
            );
            if tier.write_mode() == WriteMode::Detached {
                self.abort_pending_write(tier.kind(), &entry.user_id);
            }
            if let Err(e) = self.bounded(tier.evict(Some(&entry.user_id))).await {
                warn!(tier = %tier.kind(), error = %e, "failed to evict expired record");
            }
            return None;
        }

        Some(entry)
    }

    /// Pick the record to keep after a hit at `hit`. Returns the winner and
    /// the index of the tier it came from.
    async fn apply_conflict_policy(
        &self,
        hit: usize,
        entry: StoredEntry,
        user_id: Option<&str>,
        now: i64,
    ) -> (StoredEntry, usize) {
        if self.config.conflict_policy == ConflictPolicy::RemoteWins {
            return (entry, hit);
        }

        let mut best = (entry, hit);
        for (index, tier) in self.tiers.iter().enumerate().skip(hit + 1) {
            if tier.requires_user() && user_id.is_none() {
                continue;
            }
            let candidate = match self.bounded(tier.fetch(user_id)).await {
                Ok(Some(candidate)) => candidate,
                Ok(None) => continue,
                Err(e) => {
                    debug!(tier = %tier.kind(), error = %e, "skipping tier in refresh comparison");
                    continue;
                }
            };
            if candidate.user_id == best.0.user_id
                && candidate.record.is_valid_at(now)
                && candidate.record.last_refresh > best.0.record.last_refresh
            {
                debug!(
                    tier = %tier.kind(),
                    last_refresh = candidate.record.last_refresh,
                    "newer token record found in later tier"
                );
                best = (candidate, index);
            }
        }
        best
    }

    /// Write `winner` to every tier from `hit` onwards except its source.
    async fn back_fill(&self, hit: usize, source: usize, winner: &StoredEntry) {
        for (index, tier) in self.tiers.iter().enumerate().skip(hit) {
            if index == source {
                continue;
            }
            match tier.write_mode() {
                WriteMode::Detached => {
                    self.spawn_write(tier.clone(), winner.clone());
                }
                WriteMode::Awaited => {
                    if let Err(e) = self.bounded(tier.store(winner)).await {
                        warn!(tier = %tier.kind(), error = %e, "back-fill failed");
                    }
                }
            }
        }
    }

    fn spawn_write(&self, tier: Arc<dyn TokenTier>, entry: StoredEntry) -> RemoteWrite {
        let timeout = self.config.io_timeout;
        let key = (tier.kind(), entry.user_id.clone());

        let handle = tokio::spawn(async move {
            let kind = tier.kind();
            match tokio::time::timeout(timeout, tier.store(&entry)).await {
                Ok(Ok(())) => {
                    debug!(tier = %kind, user_id = %entry.user_id, "write-through complete");
                    true
                }
                Ok(Err(e)) => {
                    warn!(
                        tier = %kind,
                        user_id = %entry.user_id,
                        error = %e,
                        transient = e.is_transient(),
                        "write-through failed"
                    );
                    false
                }
                Err(_) => {
                    warn!(tier = %kind, user_id = %entry.user_id, "write-through timed out");
                    false
                }
            }
        });

        match self.pending_writes.lock() {
            Ok(mut pending) => {
                pending.retain(|_, write| !write.is_finished());
                if let Some(previous) = pending.insert(key, handle.abort_handle()) {
                    previous.abort();
                }
            }
            Err(_) => warn!("pending write registry poisoned, write not tracked"),
        }

        RemoteWrite {
            handle: Some(handle),
        }
    }

    fn abort_pending_write(&self, kind: TierKind, user_id: &str) {
        let Ok(mut pending) = self.pending_writes.lock() else {
            warn!("pending write registry poisoned, nothing aborted");
            return;
        };
        if let Some(write) = pending.remove(&(kind, user_id.to_string())) {
            debug!(tier = %kind, user_id = %user_id, "aborting pending write");
            write.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_writes(&self) -> usize {
        self.pending_writes.lock().map_or(0, |pending| pending.len())
    }

    fn abort_pending_writes(&self, user_id: Option<&str>) {
        let Ok(mut pending) = self.pending_writes.lock() else {
            warn!("pending write registry poisoned, nothing aborted");
            return;
        };
        pending.retain(|(_, owner), handle| {
            let matches = user_id.map_or(true, |id| id == owner);
            if matches {
                handle.abort();
            }
            !matches
        });
    }

    /// After a miss, drop state-store tokens that can no longer be trusted.
    fn clear_stale_state(&self, user_id: Option<&str>) {
        let now = self.clock.now_millis();
        let stale = self.store.read(|state| {
            let Some(tokens) = &state.tokens else {
                return false;
            };
            user_id.is_none()
                || state.token_owner.as_deref() == user_id
                || !tokens.is_valid_at(now)
        });
        if stale {
            self.store.dispatch(SessionAction::TokensCleared);
        }
    }

    fn publish(&self, entry: &StoredEntry) {
        self.store.dispatch(SessionAction::TokensResolved {
            user_id: entry.user_id.clone(),
            record: entry.record.clone(),
        });
    }

    fn memory(&self) -> SessionResult<MutexGuard<'_, Option<StoredEntry>>> {
        self.memory
            .lock()
            .map_err(|e| SessionError::MemoryTier(e.to_string()))
    }

    async fn bounded<T>(&self, fut: impl Future<Output = SessionResult<T>>) -> SessionResult<T> {
        match tokio::time::timeout(self.config.io_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        }
    }
}

impl std::fmt::Debug for TokenSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSessionManager")
            .field("tiers", &self.tier_order())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_storage::MemoryCache;

    fn record(expiry: i64) -> TokenRecord {
        TokenRecord {
            id_token: "id".to_string(),
            access_token: String::new(),
            refresh_token: "refresh".to_string(),
            token_expiry: expiry,
            last_refresh: 0,
        }
    }

    #[test]
    fn test_manager_config_from_config() {
        let mut config = Config::new();
        config.remote_timeout_ms = 1_500;
        config.conflict_policy = ConflictPolicy::NewestRefreshWins;

        let manager_config = ManagerConfig::from(&config);
        assert_eq!(manager_config.io_timeout, Duration::from_millis(1_500));
        assert_eq!(
            manager_config.conflict_policy,
            ConflictPolicy::NewestRefreshWins
        );
    }

    #[test]
    fn test_remote_tier_is_ordered_first() {
        let manager = TokenSessionManager::new(SessionStore::new(), ManagerConfig::default())
            .with_local_cache(Arc::new(MemoryCache::new()))
            .with_remote_store(
                Arc::new(crate::tests::harness::FakeRemoteStore::new()),
                Arc::new(DeviceIdentity::fixed("device-1")),
            );
        assert_eq!(manager.tier_order(), vec![TierKind::Remote, TierKind::Local]);
    }

    #[tokio::test]
    async fn test_memory_only_manager() {
        let clock = Arc::new(crate::ManualClock::new(0));
        let manager = TokenSessionManager::new(SessionStore::new(), ManagerConfig::default())
            .with_clock(clock.clone());

        let write = manager.save("u1", record(1_000)).await.unwrap();
        assert!(write.wait().await);
        assert_eq!(manager.load(Some("u1")).await.unwrap(), Some(record(1_000)));

        clock.set(1_000);
        assert_eq!(manager.load(Some("u1")).await.unwrap(), None);
        assert!(!manager.store().snapshot().persistence_restored);
    }

    #[tokio::test]
    async fn test_rejects_malformed_records() {
        let manager = TokenSessionManager::new(SessionStore::new(), ManagerConfig::default());
        let mut bad = record(1_000);
        bad.refresh_token.clear();

        assert!(matches!(
            manager.save("u1", bad).await,
            Err(SessionError::InvalidRecord(_))
        ));
        assert!(matches!(
            manager.save("  ", record(1_000)).await,
            Err(SessionError::InvalidUserId(_))
        ));
        assert!(manager.store().snapshot().tokens.is_none());
    }

    #[tokio::test]
    async fn test_poisoned_memory_is_fatal() {
        let manager = Arc::new(TokenSessionManager::new(
            SessionStore::new(),
            ManagerConfig::default(),
        ));
        let poisoner = manager.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.memory.lock().unwrap();
            panic!("poison the memory tier");
        })
        .join();

        let err = manager.save("u1", record(i64::MAX)).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            manager.load(Some("u1")).await,
            Err(SessionError::MemoryTier(_))
        ));
        assert!(manager.clear_all(Some("u1")).await.is_err());
        assert!(!manager.has_valid_tokens(Some("u1")).await);
        assert!(!manager.store().snapshot().loading);
    }
}
