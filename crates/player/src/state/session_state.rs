//! Session slice of the host state.

use super::action::{action_types, Action};

/// The current game session as seen by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Server-assigned join key. Immutable once set.
    pub join_key: Option<String>,
    /// Endpoint of the connection the session was established on, while it is up.
    pub endpoint: Option<String>,
}

impl SessionState {
    /// Whether the server has assigned a join key.
    pub fn is_established(&self) -> bool {
        self.join_key.is_some()
    }

    /// Whether the session is established and its connection is still up.
    pub fn is_connected(&self) -> bool {
        self.is_established() && self.endpoint.is_some()
    }
}

pub fn session_reducer(state: &mut SessionState, action: &Action) {
    match action.action_type.as_str() {
        action_types::SESSION_ESTABLISHED => {
            match (&state.join_key, action.get_str("joinKey")) {
                (None, Some(key)) if !key.is_empty() => {
                    state.join_key = Some(key.to_string());
                }
                (Some(existing), Some(key)) if existing != key => {
                    tracing::warn!(
                        join_key = %existing,
                        rejected = %key,
                        "Ignoring new join key for an established session"
                    );
                }
                _ => {}
            }
            if state.join_key.is_some() {
                state.endpoint = action.get_str("endpoint").map(str::to_string);
            }
        }
        action_types::WS_DISCONNECT | action_types::DIAGNOSTIC | action_types::CLOSED => {
            state.endpoint = None;
        }
        _ => {}
    }
}
