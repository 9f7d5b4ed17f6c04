//! Sorcerer Shared - Wire protocol for Player and game server communication
//!
//! This crate contains the types exchanged over the game WebSocket:
//! - Outbound commands (`ClientMessage`) and inbound events (`ServerMessage`)
//! - The loosely-typed envelopes used at the socket boundary
//!   (`InboundMessage`, `OutboundMessage`)
//! - `WireError` for frames that cannot be framed or decoded
//!
//! Every frame on the wire is a JSON object of the shape
//! `{ "kind": string, ...payload }`.

pub mod error;
pub mod messages;

pub use error::WireError;
pub use messages::{ClientMessage, InboundMessage, OutboundMessage, ServerMessage, KIND_FIELD};
