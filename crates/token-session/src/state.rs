//! Reactive session state observed by the UI.
//!
//! The manager and the bridge are the only writers; everything else reads a
//! snapshot or subscribes. Each action is applied in a single closure so
//! readers never see a half-updated state.

use serde::{Deserialize, Serialize};
use session_storage::TokenRecord;
use std::sync::Arc;
use tokio::sync::watch;

/// The signed-in user as the application sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SessionUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
        }
    }
}

/// Snapshot of the application session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Last known-valid token record.
    pub tokens: Option<TokenRecord>,
    /// User the tokens belong to.
    pub token_owner: Option<String>,
    /// Committed user from the auth bridge.
    pub user: Option<SessionUser>,
    /// At least one load has completed.
    pub initialized: bool,
    /// A load is in progress.
    pub loading: bool,
    /// A durable tier has been consulted since startup.
    pub persistence_restored: bool,
}

impl SessionState {
    /// True when the state holds tokens valid at `now_ms` for `user_id`
    /// (any owner when `user_id` is `None`).
    pub fn has_valid_tokens_at(&self, now_ms: i64, user_id: Option<&str>) -> bool {
        let Some(tokens) = &self.tokens else {
            return false;
        };
        let owned = match user_id {
            Some(user_id) => self.token_owner.as_deref() == Some(user_id),
            None => true,
        };
        owned && tokens.is_valid_at(now_ms)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum SessionAction {
    TokensResolved { user_id: String, record: TokenRecord },
    TokensCleared,
    UserChanged(Option<SessionUser>),
    ResolutionStarted,
    ResolutionFinished { restored: bool },
}

/// Apply an action. Returns whether anything changed.
pub(crate) fn reduce(state: &mut SessionState, action: SessionAction) -> bool {
    let before = state.clone();
    match action {
        SessionAction::TokensResolved { user_id, record } => {
            state.tokens = Some(record);
            state.token_owner = Some(user_id);
        }
        SessionAction::TokensCleared => {
            state.tokens = None;
            state.token_owner = None;
        }
        SessionAction::UserChanged(user) => {
            state.user = user;
        }
        SessionAction::ResolutionStarted => {
            state.loading = true;
        }
        SessionAction::ResolutionFinished { restored } => {
            state.loading = false;
            state.initialized = true;
            state.persistence_restored |= restored;
        }
    }
    *state != before
}

/// Shared handle to the session state.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx: Arc::new(tx) }
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Read the current state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub(crate) fn dispatch(&self, action: SessionAction) {
        self.tx.send_if_modified(|state| reduce(state, action));
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_tokens_resolved_then_cleared() {
        let mut state = SessionState::default();
        assert!(reduce(
            &mut state,
            SessionAction::TokensResolved {
                user_id: "u1".to_string(),
                record: record(10_000),
            }
        ));
        assert_eq!(state.token_owner.as_deref(), Some("u1"));
        assert!(reduce(&mut state, SessionAction::TokensCleared));
        assert!(state.tokens.is_none());
        assert!(state.token_owner.is_none());
        assert!(!reduce(&mut state, SessionAction::TokensCleared));
    }

    #[test]
    fn test_resolution_flags() {
        let mut state = SessionState::default();
        reduce(&mut state, SessionAction::ResolutionStarted);
        assert!(state.loading);
        assert!(!state.initialized);

        reduce(&mut state, SessionAction::ResolutionFinished { restored: true });
        assert!(!state.loading);
        assert!(state.initialized);
        assert!(state.persistence_restored);

        // Once restored, stays restored.
        reduce(&mut state, SessionAction::ResolutionStarted);
        reduce(&mut state, SessionAction::ResolutionFinished { restored: false });
        assert!(state.persistence_restored);
    }

    #[test]
    fn test_has_valid_tokens_respects_owner_and_expiry() {
        let mut state = SessionState::default();
        reduce(
            &mut state,
            SessionAction::TokensResolved {
                user_id: "u1".to_string(),
                record: record(10_000),
            },
        );
        assert!(state.has_valid_tokens_at(5_000, Some("u1")));
        assert!(state.has_valid_tokens_at(5_000, None));
        assert!(!state.has_valid_tokens_at(5_000, Some("u2")));
        assert!(!state.has_valid_tokens_at(10_000, Some("u1")));
    }

    #[tokio::test]
    async fn test_store_notifies_subscribers_only_on_change() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        store.dispatch(SessionAction::UserChanged(Some(SessionUser::new("u1"))));
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().user.as_ref().map(|u| u.id.as_str()),
            Some("u1")
        );

        store.dispatch(SessionAction::UserChanged(Some(SessionUser::new("u1"))));
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.read(|s| s.user.clone()), Some(SessionUser::new("u1")));
    }
}
