//! Session token management for the fitness app.
//!
//! This crate provides:
//! - [`TokenSessionManager`], the single source of truth for "do we have
//!   usable session tokens", reading and writing across the memory, remote
//!   and on-device tiers
//! - [`SessionStore`], the reactive application state the UI observes
//! - [`AuthEventBridge`], which turns bursty identity provider notifications
//!   into one settled transition per logical change
//!
//! ```rust,ignore
//! let store = SessionStore::new();
//! let manager = Arc::new(
//!     TokenSessionManager::new(store.clone(), ManagerConfig::from(&config))
//!         .with_remote_store(remote, device)
//!         .with_local_cache(Arc::new(FileCache::new(paths.local_cache_file()))),
//! );
//! let bridge = AuthEventBridge::spawn(
//!     BridgeDeps { manager: manager.clone(), profiles, sink },
//!     BridgeConfig::from(&config),
//! );
//! bridge.attach(&identity_provider);
//! ```

mod bridge;
mod bridge_fsm;
mod clock;
mod collaborators;
mod error;
mod manager;
mod state;
mod tier;

#[cfg(test)]
mod tests;

pub use bridge::{AuthEventBridge, BridgeConfig, BridgeDeps, BridgeStats, UserChangedNotifier};
pub use bridge_fsm::bridge_machine;
pub use bridge_fsm::{BridgeMachine, BridgeMachineInput, BridgeMachineState, BridgeState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    AuthUser, CollaboratorError, IdentityProvider, PersistedSession, PersistenceSink,
    ProfileLoader, Subscription, UserChangedCallback,
};
pub use error::{SessionError, SessionResult};
pub use manager::{ManagerConfig, RemoteWrite, TokenSessionManager};
pub use state::{SessionState, SessionStore, SessionUser};
pub use tier::{LocalTier, RemoteTier, TierKind, TokenTier, WriteMode};

pub use session_config_and_utils::ConflictPolicy;
pub use session_storage::{StoredEntry, TokenRecord};
