//! Scriptable socket connector for testing
//!
//! The connector remembers every socket it opened. Tests drive a socket's
//! lifecycle by hand (`open`, `receive`, `drop_connection`, ...) and assert on
//! what the bridge sent through it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use sorcerer_shared::OutboundMessage;

use crate::error::BridgeError;
use crate::ports::outbound::{
    HandleId, SocketConnector, SocketEvent, SocketEvents, SocketHandle, SocketState,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

/// `SocketConnector` that hands out [`FakeSocket`]s.
#[derive(Clone, Default)]
pub struct FakeConnector {
    sockets: Arc<Mutex<Vec<FakeSocket>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every socket opened so far, oldest first.
    pub fn sockets(&self) -> Vec<FakeSocket> {
        lock(&self.sockets).clone()
    }

    /// The most recently opened socket.
    pub fn last(&self) -> Option<FakeSocket> {
        lock(&self.sockets).last().cloned()
    }

    pub fn opened_count(&self) -> usize {
        lock(&self.sockets).len()
    }
}

impl SocketConnector for FakeConnector {
    fn open(&self, address: &str, events: SocketEvents) -> Box<dyn SocketHandle> {
        let socket = FakeSocket::new(address, events);
        lock(&self.sockets).push(socket.clone());
        Box::new(socket)
    }
}

struct FakeSocketState {
    state: SocketState,
    sent: Vec<OutboundMessage>,
}

/// Socket whose lifecycle is driven by the test.
///
/// Clones share state, so the test keeps a clone while the bridge owns the
/// boxed handle.
#[derive(Clone)]
pub struct FakeSocket {
    address: Arc<str>,
    events: SocketEvents,
    inner: Arc<Mutex<FakeSocketState>>,
    close_calls: Arc<AtomicUsize>,
}

impl FakeSocket {
    fn new(address: &str, events: SocketEvents) -> Self {
        Self {
            address: Arc::from(address),
            events,
            inner: Arc::new(Mutex::new(FakeSocketState {
                state: SocketState::Connecting,
                sent: Vec::new(),
            })),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn set_state(&self, state: SocketState) {
        lock(&self.inner).state = state;
    }

    /// Complete the connection.
    pub fn open(&self) {
        self.set_state(SocketState::Open);
        self.events.emit(SocketEvent::Opened);
    }

    /// Fail the connection attempt.
    pub fn fail(&self, reason: &str) {
        self.set_state(SocketState::Failed);
        let err = BridgeError::transport(&*self.address, reason);
        self.events.emit(SocketEvent::Failed(err.clone()));
        self.events.close(Some(err));
    }

    /// Deliver a text frame from the server.
    pub fn receive(&self, text: &str) {
        self.events.emit(SocketEvent::Message(text.to_string()));
    }

    pub fn receive_json(&self, value: Value) {
        self.receive(&value.to_string());
    }

    /// Lose the connection abnormally.
    pub fn drop_connection(&self, reason: &str) {
        self.set_state(SocketState::Failed);
        self.events
            .close(Some(BridgeError::transport(&*self.address, reason)));
    }

    /// The server closes the connection cleanly.
    pub fn server_close(&self) {
        self.set_state(SocketState::Closed);
        self.events.close(None);
    }

    /// Payloads written to the socket, in order.
    pub fn sent_payloads(&self) -> Vec<Value> {
        lock(&self.inner)
            .sent
            .iter()
            .map(|message| Value::Object(message.payload().clone()))
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl SocketHandle for FakeSocket {
    fn id(&self) -> HandleId {
        self.events.handle_id()
    }

    fn address(&self) -> String {
        self.address.to_string()
    }

    fn state(&self) -> SocketState {
        lock(&self.inner).state
    }

    fn send(&self, message: OutboundMessage) -> Result<(), BridgeError> {
        let mut inner = lock(&self.inner);
        if inner.state != SocketState::Open {
            return Err(BridgeError::usage(format!(
                "cannot send on socket {} while {:?}",
                self.events.handle_id(),
                inner.state
            )));
        }
        inner.sent.push(message);
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut inner = lock(&self.inner);
            if inner.state.is_terminal() {
                return;
            }
            inner.state = SocketState::Closed;
        }
        self.events.close(None);
    }
}
