//! WebSocket connection to the game server
//!
//! - `socket`: tokio-tungstenite backed [`SocketHandle`](crate::ports::outbound::SocketHandle)
//! - `router`: pure routing decisions for outbound actions and inbound frames
//! - `bridge`: the connection bridge installed in the host's dispatch chain
//! - `connection`: bridge lifecycle state and its observer
//! - `message_builder`: server-bound game command actions
//! - `reconnect`: optional reconnect-after-failure policies

mod bridge;
mod connection;
mod message_builder;
mod reconnect;
pub mod router;
mod socket;

pub use bridge::{Bridge, BridgeConfig, BridgeStats, EventPump};
pub use connection::{BridgeState, BridgeStateObserver};
pub use message_builder::GameCommands;
pub use reconnect::{ExponentialBackoff, NeverReconnect, ReconnectPolicy};
pub use router::{classify_inbound, route, Inbound, Route};
pub use socket::{TungsteniteConnector, TungsteniteSocket};
