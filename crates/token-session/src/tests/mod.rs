//! Integration tests for the token session crate.
//!
//! - `harness.rs`  - fake tiers, fake identity provider, recording collaborators
//! - `manager.rs`  - tier resolution, write-through, eviction, conflict policy
//! - `bridge.rs`   - settle window, loop guard, sign-out fast path
//! - `scenario.rs` - end-to-end session lifecycles across manager and bridge
