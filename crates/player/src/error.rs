//! Connection bridge error taxonomy.
//!
//! None of these are ever returned to a dispatch caller. Transport errors move
//! the bridge to `Disconnected` and are surfaced to the host as a diagnostic
//! action; protocol and usage errors are logged, counted and dropped.

use std::fmt::Display;

use sorcerer_shared::WireError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Socket failed to open or closed abnormally.
    #[error("transport error on {address}: {reason}")]
    Transport { address: String, reason: String },

    /// Malformed or unrecognized inbound message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation attempted in the wrong state.
    #[error("usage error: {0}")]
    Usage(String),
}

impl BridgeError {
    pub fn transport(address: impl Into<String>, reason: impl Display) -> Self {
        Self::Transport {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(reason: impl Display) -> Self {
        Self::Protocol(reason.to_string())
    }

    pub fn usage(reason: impl Display) -> Self {
        Self::Usage(reason.to_string())
    }

    /// Short category name, used in diagnostic actions and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            BridgeError::Transport { .. } => "transport",
            BridgeError::Protocol(_) => "protocol",
            BridgeError::Usage(_) => "usage",
        }
    }
}

impl From<WireError> for BridgeError {
    fn from(err: WireError) -> Self {
        Self::Protocol(err.to_string())
    }
}
