//! Desktop WebSocket handle using tokio-tungstenite
//!
//! Each handle runs one tokio task that connects, then multiplexes the
//! outbound queue, inbound frames and the shutdown signal until the socket
//! ends. All lifecycle notifications go through [`SocketEvents`], which
//! guarantees a single terminal `Closed`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sorcerer_shared::OutboundMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::error::BridgeError;
use crate::ports::outbound::{
    HandleId, SocketConnector, SocketEvent, SocketEvents, SocketHandle, SocketState,
};

/// Opens [`TungsteniteSocket`]s. Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    outbound_buffer: usize,
}

impl TungsteniteConnector {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            outbound_buffer: outbound_buffer.max(1),
        }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(32)
    }
}

impl SocketConnector for TungsteniteConnector {
    fn open(&self, address: &str, events: SocketEvents) -> Box<dyn SocketHandle> {
        Box::new(TungsteniteSocket::spawn(
            address,
            events,
            self.outbound_buffer,
        ))
    }
}

/// WebSocket handle backed by a background tokio task
pub struct TungsteniteSocket {
    id: HandleId,
    address: String,
    state: Arc<AtomicU8>,
    tx: mpsc::Sender<OutboundMessage>,
    shutdown: CancellationToken,
}

impl TungsteniteSocket {
    pub fn spawn(address: &str, events: SocketEvents, outbound_buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel::<OutboundMessage>(outbound_buffer.max(1));
        let state = Arc::new(AtomicU8::new(SocketState::Connecting.to_u8()));
        let shutdown = CancellationToken::new();

        let id = events.handle_id();
        tokio::spawn(run_socket(
            address.to_string(),
            events,
            Arc::clone(&state),
            rx,
            shutdown.clone(),
        ));

        Self {
            id,
            address: address.to_string(),
            state,
            tx,
            shutdown,
        }
    }
}

impl SocketHandle for TungsteniteSocket {
    fn id(&self) -> HandleId {
        self.id
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn state(&self) -> SocketState {
        SocketState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, message: OutboundMessage) -> Result<(), BridgeError> {
        let state = self.state();
        if state != SocketState::Open {
            return Err(BridgeError::usage(format!(
                "cannot send on socket {} while {:?}",
                self.id, state
            )));
        }
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                BridgeError::transport(&self.address, "outbound queue full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                BridgeError::usage(format!("socket {} already closed", self.id))
            }
        })
    }

    fn close(&self) {
        let state = self.state();
        if matches!(state, SocketState::Closing) || state.is_terminal() {
            return;
        }
        set_state(&self.state, SocketState::Closing);
        self.shutdown.cancel();
    }
}

impl Drop for TungsteniteSocket {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn set_state(state: &AtomicU8, new_state: SocketState) {
    state.store(new_state.to_u8(), Ordering::SeqCst);
}

async fn run_socket(
    address: String,
    events: SocketEvents,
    state: Arc<AtomicU8>,
    mut rx: mpsc::Receiver<OutboundMessage>,
    shutdown: CancellationToken,
) {
    let handle_id = events.handle_id();

    let connected = tokio::select! {
        _ = shutdown.cancelled() => {
            tracing::debug!(handle_id, "Socket closed before it connected");
            set_state(&state, SocketState::Closed);
            events.close(None);
            return;
        }
        result = connect_async(address.as_str()) => result,
    };

    let mut ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::error!(handle_id, %address, "Failed to connect to game server: {}", e);
            set_state(&state, SocketState::Failed);
            let err = BridgeError::transport(&address, e);
            events.emit(SocketEvent::Failed(err.clone()));
            events.close(Some(err));
            return;
        }
    };

    if shutdown.is_cancelled() {
        tracing::debug!(handle_id, "Socket closed while the handshake completed");
        let _ = ws_stream.close(None).await;
        set_state(&state, SocketState::Closed);
        events.close(None);
        return;
    }

    tracing::info!(handle_id, %address, "Connected to game server");
    set_state(&state, SocketState::Open);
    events.emit(SocketEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    let error = loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                tracing::debug!(handle_id, "Close requested");
                break None;
            }

            outgoing = rx.recv() => {
                let Some(message) = outgoing else {
                    // Handle dropped without an explicit close.
                    break None;
                };
                let text = match message.to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(handle_id, "Failed to serialize WebSocket message: {}", e);
                        continue;
                    }
                };
                tracing::debug!(handle_id, kind = ?message.kind(), "send");
                if let Err(e) = write.send(Message::Text(text)).await {
                    break Some(BridgeError::transport(&address, e));
                }
            }

            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    events.emit(SocketEvent::Message(text));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(handle_id, ?frame, "Server closed connection");
                    break None;
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::warn!(handle_id, len = data.len(), "Ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(handle_id, "WebSocket error: {}", e);
                    break Some(BridgeError::transport(&address, e));
                }
                None => {
                    break Some(BridgeError::transport(&address, "connection ended without a close frame"));
                }
            },
        }
    };

    if let Err(e) = write.close().await {
        tracing::debug!(handle_id, "Error while closing socket: {}", e);
    }

    set_state(
        &state,
        if error.is_some() {
            SocketState::Failed
        } else {
            SocketState::Closed
        },
    );
    events.close(error);
}
