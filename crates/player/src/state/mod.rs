//! Host state container
//!
//! A minimal action store in the shape the connection bridge plugs into:
//! actions flow through a middleware chain and end at a reducer. The bridge
//! only ever reads the session slice and mutates it by dispatching.

mod action;
mod app_state;
mod session_state;
mod store;

pub use action::{action_types, Action};
pub use app_state::{app_reducer, AppState};
pub use session_state::{session_reducer, SessionState};
pub use store::{logging_middleware, Dispatch, Middleware, Reducer, Store, StoreHost, WeakStore};
