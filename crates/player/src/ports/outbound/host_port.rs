//! Host Port - the state container as seen by the bridge

use crate::state::{Action, SessionState};

/// Port onto the host state container.
///
/// The bridge requests every session mutation through `dispatch` and only
/// ever reads state through `session`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait HostPort: Send + Sync {
    /// Dispatch an action through the host's full middleware chain.
    fn dispatch(&self, action: Action);

    /// Current session slice.
    ///
    /// Returns owned data for mockall compatibility.
    fn session(&self) -> SessionState;
}
