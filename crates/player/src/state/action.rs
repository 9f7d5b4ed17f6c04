//! Host actions
//!
//! An action is a JSON object `{ "type": string, ...payload }`. The `type`
//! doubles as the routing tag: actions typed `"server"` are bound for the game
//! server and never reach a reducer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BridgeError;

/// Well-known action types.
pub mod action_types {
    /// Routing tag for actions whose payload goes over the socket.
    pub const SERVER: &str = "server";
    /// Open the game connection.
    pub const WS_CONNECT: &str = "WS_CONNECT";
    /// Close the game connection.
    pub const WS_DISCONNECT: &str = "WS_DISCONNECT";
    /// The server assigned a join key.
    pub const SESSION_ESTABLISHED: &str = "game/sessionEstablished";
    /// Inbound processing finished; re-evaluate derived state.
    pub const TICK: &str = "bridge/tick";
    /// A transport failure was observed.
    pub const DIAGNOSTIC: &str = "bridge/diagnostic";
    /// The server closed the connection cleanly.
    pub const CLOSED: &str = "bridge/closed";
    /// Prefix of actions translated from server game messages.
    pub const GAME_PREFIX: &str = "game/";
}

use action_types::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            payload: Map::new(),
        }
    }

    /// Builder-style payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn is(&self, action_type: &str) -> bool {
        self.action_type == action_type
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// A server-bound action carrying `payload`.
    pub fn server(payload: Map<String, Value>) -> Self {
        Self {
            action_type: SERVER.to_string(),
            payload,
        }
    }

    pub fn connect() -> Self {
        Self::new(WS_CONNECT)
    }

    pub fn disconnect() -> Self {
        Self::new(WS_DISCONNECT)
    }

    pub fn session_established(join_key: &str, endpoint: &str) -> Self {
        Self::new(SESSION_ESTABLISHED)
            .with("joinKey", join_key)
            .with("endpoint", endpoint)
    }

    pub fn tick() -> Self {
        Self::new(TICK)
    }

    pub fn diagnostic(error: &BridgeError) -> Self {
        Self::new(DIAGNOSTIC)
            .with("error", error.category())
            .with("message", error.to_string())
    }

    pub fn closed() -> Self {
        Self::new(CLOSED)
    }

    /// Action for a translated server game message, typed `game/<kind>`.
    pub fn game_event(kind: &str, payload: Map<String, Value>) -> Self {
        Self {
            action_type: format!("{GAME_PREFIX}{kind}"),
            payload,
        }
    }

    /// Drop the routing tag, keeping only what goes on the wire.
    pub fn into_server_payload(self) -> Map<String, Value> {
        self.payload
    }
}
