//! Auth event bridge state machine using rust-fsm.
//!
//! ```text
//!            Notified                SettleElapsed
//!   Idle ──────────────► Debouncing ───────────────► Committing
//!    │                    │    ▲                         │
//!    │                    └────┘ Notified                │ CommitIssued
//!    │ SignedOut                 SignedOut               ▼
//!    └──────────────────────────────────────────►      Idle
//! ```
//!
//! Sign-out skips the settle window entirely.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub bridge_machine(Idle)

    Idle => {
        Notified => Debouncing,
        SignedOut => Committing
    },
    Debouncing => {
        // Latest value replaces the pending one; the deadline stays put
        Notified => Debouncing,
        SettleElapsed => Committing,
        SignedOut => Committing
    },
    Committing => {
        CommitIssued => Idle
    }
}

pub use bridge_machine::Input as BridgeMachineInput;
pub use bridge_machine::State as BridgeMachineState;
pub use bridge_machine::StateMachine as BridgeMachine;

/// Bridge state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// No notification pending.
    Idle,
    /// Waiting for the settle window to close.
    Debouncing,
    /// Issuing a commit.
    Committing,
}

impl BridgeState {
    pub fn is_settling(&self) -> bool {
        matches!(self, BridgeState::Debouncing)
    }
}

impl From<&BridgeMachineState> for BridgeState {
    fn from(state: &BridgeMachineState) -> Self {
        match state {
            BridgeMachineState::Idle => BridgeState::Idle,
            BridgeMachineState::Debouncing => BridgeState::Debouncing,
            BridgeMachineState::Committing => BridgeState::Committing,
        }
    }
}
