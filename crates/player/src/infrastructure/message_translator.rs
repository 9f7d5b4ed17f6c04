//! Message Translator - Converts server messages to host actions
//!
//! Each game message the server sends becomes one `game/<kind>` action with a
//! camelCase payload, so reducers never see wire field names. Session
//! handshake messages are not game events; the bridge handles those itself.

use serde_json::{Map, Value};
use sorcerer_shared::ServerMessage;

use crate::state::Action;

/// Translate a server game message into a host action.
///
/// Returns `None` for `init` (session handshake) and unknown kinds.
pub fn translate(msg: &ServerMessage) -> Option<Action> {
    let mut payload = Map::new();
    match msg {
        ServerMessage::Init { .. } | ServerMessage::Unknown => return None,
        ServerMessage::Joined { player_id } => {
            payload.insert("playerId".to_string(), Value::from(*player_id));
        }
        ServerMessage::Setup { message } => {
            payload.insert("message".to_string(), Value::from(message.clone()));
        }
        ServerMessage::NextRound => {}
        ServerMessage::State { game } | ServerMessage::Bet { game } => {
            payload.insert("game".to_string(), game.clone());
        }
        ServerMessage::Incr { count, player_id } => {
            payload.insert("count".to_string(), Value::from(*count));
            payload.insert("playerId".to_string(), Value::from(*player_id));
        }
        ServerMessage::Error { message } => {
            tracing::warn!(%message, "Server rejected a request");
            payload.insert("message".to_string(), Value::from(message.clone()));
        }
        ServerMessage::Violation { message } => {
            tracing::warn!(%message, "Game rule violated");
            payload.insert("message".to_string(), Value::from(message.clone()));
        }
    }
    Some(Action::game_event(msg.kind(), payload))
}
