//! Sorcerer Player crate.
//!
//! The client side of the game connection: a small action store (`state`),
//! the ports it talks through (`ports`), and the WebSocket connection bridge
//! that sits in the store's dispatch chain (`infrastructure::websocket`).

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod ports;
pub mod state;

pub use config::PlayerConfig;
pub use error::BridgeError;
pub use infrastructure::websocket::{Bridge, BridgeConfig, BridgeState, EventPump};
pub use state::{Action, AppState, SessionState, Store};
