//! Server-bound game commands
//!
//! Centralizes construction of routing-tagged actions so hosts never
//! hand-assemble `{ "type": "server", ... }` objects.
//!
//! # Usage
//!
//! ```rust,ignore
//! store.dispatch(Some(GameCommands::bet(&["monster-1", "monster-3"])));
//! ```

use serde_json::Map;
use sorcerer_shared::ClientMessage;

use crate::state::Action;

pub struct GameCommands;

impl GameCommands {
    /// Leader begins the game
    pub fn begin() -> Action {
        server_action(ClientMessage::Begin)
    }

    /// Ask for the latest game view
    pub fn request_state() -> Action {
        server_action(ClientMessage::State)
    }

    /// Bet on monsters during the betting phase
    pub fn bet<S: AsRef<str>>(monster_ids: &[S]) -> Action {
        server_action(ClientMessage::Bet {
            monster_ids: monster_ids.iter().map(|id| id.as_ref().to_string()).collect(),
        })
    }

    /// Leader closes betting
    pub fn next_round() -> Action {
        server_action(ClientMessage::NextRound)
    }

    /// Play a card, optionally against a target
    pub fn play_card(card_id: &str, target: Option<&str>) -> Action {
        server_action(ClientMessage::Action {
            card_id: card_id.to_string(),
            target: target.map(str::to_string),
        })
    }

    pub fn incr() -> Action {
        server_action(ClientMessage::Incr)
    }
}

fn server_action(message: ClientMessage) -> Action {
    let kind = message.kind();
    match message.into_payload() {
        Ok(payload) => Action::server(payload),
        Err(error) => {
            // The bridge rejects the resulting empty payload as malformed.
            tracing::error!(kind, %error, "Failed to encode client message");
            Action::server(Map::new())
        }
    }
}
