//! Socket Port - one bidirectional message socket
//!
//! A handle reports everything that happens to it as [`SocketEvent`]s on an
//! unbounded channel owned by the bridge. Delivery through the channel means
//! events always arrive on a later scheduler turn than the call that caused
//! them, and in order.
//!
//! Event contract per handle: exactly one of `Opened` / `Failed` while
//! establishing (unless closed first), any number of `Message`s while open,
//! then exactly one terminal `Closed`. Nothing is delivered after `Closed`;
//! [`SocketEvents`] enforces that for every implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sorcerer_shared::OutboundMessage;
use tokio::sync::mpsc;

use crate::error::BridgeError;

/// Generation token identifying one handle within a bridge.
pub type HandleId = u64;

/// Socket lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closing,
    Closed,
    Failed,
}

impl SocketState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            SocketState::Connecting => 0,
            SocketState::Open => 1,
            SocketState::Closing => 2,
            SocketState::Closed => 3,
            SocketState::Failed => 4,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => SocketState::Connecting,
            1 => SocketState::Open,
            2 => SocketState::Closing,
            4 => SocketState::Failed,
            _ => SocketState::Closed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SocketState::Closed | SocketState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Connection established; sends are now accepted.
    Opened,
    /// Connection could not be established.
    Failed(BridgeError),
    /// A text frame arrived.
    Message(String),
    /// Terminal notification. `error` is set when the close was abnormal.
    Closed { error: Option<BridgeError> },
}

/// A socket event tagged with the handle that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEnvelope {
    pub handle_id: HandleId,
    pub event: SocketEvent,
}

/// Sending side of a handle's event stream.
#[derive(Debug, Clone)]
pub struct SocketEvents {
    handle_id: HandleId,
    tx: mpsc::UnboundedSender<SocketEnvelope>,
    terminated: Arc<AtomicBool>,
}

impl SocketEvents {
    pub fn new(handle_id: HandleId, tx: mpsc::UnboundedSender<SocketEnvelope>) -> Self {
        Self {
            handle_id,
            tx,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    /// Deliver a non-terminal event. Returns false once the stream is closed.
    pub fn emit(&self, event: SocketEvent) -> bool {
        if self.terminated.load(Ordering::SeqCst) {
            return false;
        }
        self.send(event)
    }

    /// Deliver the terminal `Closed` event. Only the first call has any effect.
    pub fn close(&self, error: Option<BridgeError>) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.send(SocketEvent::Closed { error })
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn send(&self, event: SocketEvent) -> bool {
        self.tx
            .send(SocketEnvelope {
                handle_id: self.handle_id,
                event,
            })
            .is_ok()
    }
}

/// One live (or formerly live) socket, exclusively owned by a bridge.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SocketHandle: Send + Sync {
    fn id(&self) -> HandleId;

    /// Remote address as an owned String (mockall compatibility).
    fn address(&self) -> String;

    fn state(&self) -> SocketState;

    /// Queue a message for transmission.
    ///
    /// Only valid while `Open`; otherwise returns `BridgeError::Usage`.
    fn send(&self, message: OutboundMessage) -> Result<(), BridgeError>;

    /// Request graceful shutdown. Idempotent.
    fn close(&self);
}

/// Factory for socket handles.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SocketConnector: Send + Sync {
    /// Begin connecting to `address`. Never fails synchronously: failures are
    /// reported through `events`.
    fn open(&self, address: &str, events: SocketEvents) -> Box<dyn SocketHandle>;
}
