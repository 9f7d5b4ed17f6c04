//! Host port that records dispatches

use std::sync::{Mutex, MutexGuard};

use crate::ports::outbound::HostPort;
use crate::state::{session_reducer, Action, SessionState};

/// `HostPort` that records every dispatched action and keeps a session slice
/// up to date with the real session reducer.
#[derive(Default)]
pub struct RecordingHost {
    actions: Mutex<Vec<Action>>,
    session: Mutex<SessionState>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an already established session.
    pub fn with_join_key(join_key: &str) -> Self {
        let host = Self::default();
        host.lock_session().join_key = Some(join_key.to_string());
        host
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Recorded actions of one type.
    pub fn actions_of(&self, action_type: &str) -> Vec<Action> {
        self.actions()
            .into_iter()
            .filter(|action| action.is(action_type))
            .collect()
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl HostPort for RecordingHost {
    fn dispatch(&self, action: Action) {
        session_reducer(&mut self.lock_session(), &action);
        self.actions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(action);
    }

    fn session(&self) -> SessionState {
        self.lock_session().clone()
    }
}
