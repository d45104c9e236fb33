//! Contracts for the app-supplied collaborators the bridge talks to.

use crate::state::SessionUser;
use async_trait::async_trait;
use serde::Serialize;
use session_storage::TokenRecord;
use std::fmt;
use std::sync::Arc;

/// Error type for app-supplied collaborators.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// A user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Fresh credentials, when the notification carries them.
    pub tokens: Option<TokenRecord>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
            tokens: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tokens(mut self, tokens: TokenRecord) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// The user without credential material.
    pub fn session_user(&self) -> SessionUser {
        SessionUser {
            id: self.id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// Callback registered with an identity provider. May be invoked from any
/// thread.
pub type UserChangedCallback = Arc<dyn Fn(Option<AuthUser>) + Send + Sync>;

/// Source of "current user changed" notifications.
pub trait IdentityProvider: Send + Sync {
    fn on_user_changed(&self, callback: UserChangedCallback) -> Subscription;
}

/// Registration returned by [`IdentityProvider::on_user_changed`].
///
/// Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Loads the app profile for a committed user.
#[async_trait]
pub trait ProfileLoader: Send + Sync {
    async fn load_profile(&self, user_id: &str) -> Result<serde_json::Value, CollaboratorError>;
}

/// What the bridge hands to the persistence sink after each commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedSession {
    pub user: Option<SessionUser>,
    pub profile: Option<serde_json::Value>,
}

impl PersistedSession {
    pub fn signed_out() -> Self {
        Self {
            user: None,
            profile: None,
        }
    }
}

/// Persists the committed `{user, profile}` pair. Must be idempotent.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn persist(&self, session: PersistedSession) -> Result<(), CollaboratorError>;
}
