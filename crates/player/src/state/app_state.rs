//! Root host state.

use super::action::Action;
use super::session_state::{session_reducer, SessionState};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub session: SessionState,
}

/// Root reducer: hands each action to every slice.
pub fn app_reducer(state: &mut AppState, action: &Action) {
    session_reducer(&mut state.session, action);
}
