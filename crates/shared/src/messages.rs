//! WebSocket message types for Player-server communication
//!
//! Every frame is a JSON object tagged with a `kind` field. The typed enums
//! (`ClientMessage`, `ServerMessage`) cover the kinds the game server speaks
//! today; the envelopes (`InboundMessage`, `OutboundMessage`) are what actually
//! crosses the socket, so frames with missing or unexpected kinds can still be
//! carried far enough to be logged.
//!
//! ## Versioning Policy
//!
//! - New variants can be added at the end (forward compatible)
//! - Renaming variants is a breaking change
//! - Unknown server kinds deserialize to `ServerMessage::Unknown`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WireError;

/// Name of the tag field carried by every frame.
pub const KIND_FIELD: &str = "kind";

// =============================================================================
// Client Messages (Player → Server)
// =============================================================================

/// Messages from client (Player) to the game server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a new game, or join an existing one when `join` is set
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        join: Option<String>,
    },
    /// Leader begins the game once everyone has joined
    Begin,
    /// Request the latest game view
    State,
    /// Place bets on monsters (betting phase only)
    Bet { monster_ids: Vec<String> },
    /// Leader closes betting and starts the fight
    NextRound,
    /// Play a card, optionally against a target
    Action {
        card_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// Debug counter shared by all players in a game
    Incr,
}

impl ClientMessage {
    /// Wire kind of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Init { .. } => "init",
            ClientMessage::Begin => "begin",
            ClientMessage::State => "state",
            ClientMessage::Bet { .. } => "bet",
            ClientMessage::NextRound => "next_round",
            ClientMessage::Action { .. } => "action",
            ClientMessage::Incr => "incr",
        }
    }

    /// Flatten into the JSON object that goes on the wire.
    pub fn into_payload(self) -> Result<Map<String, Value>, WireError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(WireError::NotAnObject),
        }
    }
}

// =============================================================================
// Server Messages (Server → Player)
// =============================================================================

/// Messages from the game server to the client (Player)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Game created; carries the join key other players use to join it
    Init {
        #[serde(default, alias = "join_key")]
        join: Option<String>,
    },
    /// A player joined the game
    Joined { player_id: u32 },
    /// Server is setting up the game after the leader began it
    Setup {
        #[serde(default)]
        message: String,
    },
    /// Betting closed, fight begins
    NextRound,
    /// Latest game view, in reply to a state request
    State {
        #[serde(default)]
        game: Value,
    },
    /// Game view after a bet was accepted
    Bet {
        #[serde(default)]
        game: Value,
    },
    /// Shared counter changed
    Incr { count: i64, player_id: u32 },
    /// Request rejected by the server
    Error { message: String },
    /// A game rule was violated
    Violation { message: String },

    /// Unknown message type for forward compatibility
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Wire kind of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init { .. } => "init",
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::Setup { .. } => "setup",
            ServerMessage::NextRound => "next_round",
            ServerMessage::State { .. } => "state",
            ServerMessage::Bet { .. } => "bet",
            ServerMessage::Incr { .. } => "incr",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Violation { .. } => "violation",
            ServerMessage::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Envelopes
// =============================================================================

/// A frame received from the socket, split into its kind tag and payload.
///
/// `kind` is `None` when the tag is absent, empty, or not a string.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: Option<String>,
    pub payload: Map<String, Value>,
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, WireError> {
        let Value::Object(mut payload) = value else {
            return Err(WireError::NotAnObject);
        };
        let kind = match payload.remove(KIND_FIELD) {
            Some(Value::String(kind)) if !kind.is_empty() => Some(kind),
            _ => None,
        };
        Ok(Self { kind, payload })
    }

    /// Decode into a typed server message.
    ///
    /// Kinds the server does not define come back as `ServerMessage::Unknown`.
    pub fn to_server_message(&self) -> Result<ServerMessage, WireError> {
        let Some(kind) = &self.kind else {
            return Err(WireError::MissingKind);
        };
        let mut object = self.payload.clone();
        object.insert(KIND_FIELD.to_string(), Value::String(kind.clone()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

/// A well-formed frame ready to be written to the socket.
///
/// Construction validates that the frame carries something: either a
/// non-empty string `kind`, or at least one payload field when untagged.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage(Map<String, Value>);

impl OutboundMessage {
    pub fn kind(&self) -> Option<&str> {
        self.0.get(KIND_FIELD).and_then(Value::as_str)
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Serialize to a text frame.
    pub fn to_text(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl TryFrom<Map<String, Value>> for OutboundMessage {
    type Error = WireError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        match map.get(KIND_FIELD) {
            Some(Value::String(kind)) if !kind.is_empty() => Ok(Self(map)),
            Some(_) => Err(WireError::InvalidKind),
            None if map.is_empty() => Err(WireError::MissingKind),
            None => Ok(Self(map)),
        }
    }
}

impl TryFrom<ClientMessage> for OutboundMessage {
    type Error = WireError;

    fn try_from(message: ClientMessage) -> Result<Self, Self::Error> {
        Self::try_from(message.into_payload()?)
    }
}
