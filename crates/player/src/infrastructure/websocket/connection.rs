//! Bridge lifecycle state.
//!
//! The state lives in an `AtomicU8` so observers (UI bindings, the runner)
//! can read it without touching the bridge's lock.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Connection state of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeState {
    /// Never connected
    #[default]
    Idle,
    /// Socket is being established
    Connecting,
    /// Socket open, waiting for the server to assign a join key
    Joining,
    /// Session established
    Joined,
    /// Closed by request or by the transport
    Disconnected,
}

impl BridgeState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            BridgeState::Idle => 0,
            BridgeState::Connecting => 1,
            BridgeState::Joining => 2,
            BridgeState::Joined => 3,
            BridgeState::Disconnected => 4,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => BridgeState::Connecting,
            2 => BridgeState::Joining,
            3 => BridgeState::Joined,
            4 => BridgeState::Disconnected,
            _ => BridgeState::Idle,
        }
    }

    /// Whether server-bound actions can be forwarded in this state.
    pub fn accepts_outbound(self) -> bool {
        matches!(self, BridgeState::Joining | BridgeState::Joined)
    }

    /// Whether a connect request may start a new socket from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, BridgeState::Idle | BridgeState::Disconnected)
    }
}

/// Observable bridge state for UI binding.
#[derive(Clone)]
pub struct BridgeStateObserver {
    state: Arc<AtomicU8>,
}

impl BridgeStateObserver {
    pub fn new(state: Arc<AtomicU8>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_joined(&self) -> bool {
        self.state() == BridgeState::Joined
    }
}

pub(crate) fn store_state(state_ref: &AtomicU8, new_state: BridgeState) {
    state_ref.store(new_state.to_u8(), Ordering::SeqCst);
}
