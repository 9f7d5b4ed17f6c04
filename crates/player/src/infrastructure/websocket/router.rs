//! Routing decisions for the connection bridge.
//!
//! Both functions are pure; the bridge, the tests and any host-side tooling
//! call them to decide where an action or frame goes.

use sorcerer_shared::{InboundMessage, ServerMessage};

use crate::error::BridgeError;
use crate::state::{action_types, Action};

/// Where a dispatched action goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Strip the routing tag and send the payload over the socket.
    Outbound,
    /// Pass unchanged to the next handler.
    Local,
    /// Absent action; drop it.
    Ignored,
}

pub fn route(action: Option<&Action>) -> Route {
    match action {
        None => Route::Ignored,
        Some(action) if action.is(action_types::SERVER) => Route::Outbound,
        Some(_) => Route::Local,
    }
}

/// Classification of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A kind the server defines, decoded.
    Recognized(ServerMessage),
    /// Well-formed, but a kind this client does not know.
    Unrecognized(String),
    /// Missing kind, or fields that do not match the kind.
    Malformed(BridgeError),
}

pub fn classify_inbound(message: &InboundMessage) -> Inbound {
    let Some(kind) = &message.kind else {
        return Inbound::Malformed(BridgeError::protocol("message has no kind"));
    };
    match message.to_server_message() {
        Ok(ServerMessage::Unknown) => Inbound::Unrecognized(kind.clone()),
        Ok(decoded) => Inbound::Recognized(decoded),
        Err(err) => Inbound::Malformed(BridgeError::protocol(format!("`{kind}`: {err}"))),
    }
}
