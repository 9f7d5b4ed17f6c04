//! Connection Bridge - connects the host dispatch chain to the game socket.
//!
//! The bridge is installed as a middleware in the host store. Server-bound
//! actions are stripped of their routing tag and written to the socket;
//! everything else continues down the chain. Socket events are drained by an
//! [`EventPump`] and turned into host dispatches.
//!
//! State machine:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──opened──▶ Joining ──init{join}──▶ Joined
//!   │                   │                    │                       │
//!   └───────────────────┴──── disconnect / socket closed ────────────┴──▶ Disconnected
//! Disconnected ──connect──▶ Connecting
//! ```
//!
//! Every socket handle carries a generation id. Only events from the current
//! handle are acted on, so a superseded socket can never reach the host.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Map, Value};
use sorcerer_shared::{ClientMessage, InboundMessage, OutboundMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connection::{store_state, BridgeState, BridgeStateObserver};
use super::reconnect::{NeverReconnect, ReconnectPolicy};
use super::router::{self, Inbound, Route};
use crate::error::BridgeError;
use crate::infrastructure::message_translator;
use crate::ports::outbound::{
    HandleId, HostPort, SocketConnector, SocketEnvelope, SocketEvent, SocketEvents, SocketHandle,
};
use crate::state::{action_types, Action, Dispatch, Middleware, SessionState};

/// Bridge construction parameters. Fixed for the bridge's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Game server endpoint
    pub url: String,
    /// Join key of an existing game to join instead of starting a new one
    pub invite_key: Option<String>,
}

impl BridgeConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            invite_key: None,
        }
    }
}

/// Snapshot of the bridge's error counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Inbound frames dropped as malformed or unrecognized
    pub protocol_errors: u64,
    /// Outbound actions dropped because they were malformed or sent in the wrong state
    pub usage_errors: u64,
    /// Non-terminal events dropped because their socket had been superseded
    /// or released. The expected final `Closed` of a released socket is not
    /// counted.
    pub stale_events: u64,
}

#[derive(Default)]
struct Counters {
    protocol_errors: AtomicU64,
    usage_errors: AtomicU64,
    stale_events: AtomicU64,
}

struct Inner {
    state: BridgeState,
    handle: Option<Box<dyn SocketHandle>>,
    last_handle_id: HandleId,
    /// Key of the existing game this handle asked to join. The server's
    /// `joined` broadcast completes the handshake with it.
    pending_join: Option<String>,
    reconnect_attempts: u32,
    pending_reconnect: Option<CancellationToken>,
}

struct Shared {
    config: BridgeConfig,
    connector: Arc<dyn SocketConnector>,
    host: Arc<dyn HostPort>,
    reconnect: Arc<dyn ReconnectPolicy>,
    events_tx: mpsc::UnboundedSender<SocketEnvelope>,
    state: Arc<AtomicU8>,
    counters: Counters,
    shutdown: CancellationToken,
    inner: Mutex<Inner>,
}

/// Owns the game socket and bridges it to the host dispatch chain.
///
/// Cheap to clone; clones share the same socket and state.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

/// Drains socket events into the bridge.
///
/// Run it on the runtime with [`EventPump::run`], or drive it by hand with
/// [`EventPump::drain`] when the host owns the scheduling.
/// Reconnect timers are only started when a tokio runtime is current.
pub struct EventPump {
    bridge: Bridge,
    rx: mpsc::UnboundedReceiver<SocketEnvelope>,
}

impl Bridge {
    /// Create a bridge that never reconnects on its own.
    pub fn new(
        config: BridgeConfig,
        connector: Arc<dyn SocketConnector>,
        host: Arc<dyn HostPort>,
    ) -> (Self, EventPump) {
        Self::with_reconnect_policy(config, connector, host, Arc::new(NeverReconnect))
    }

    pub fn with_reconnect_policy(
        config: BridgeConfig,
        connector: Arc<dyn SocketConnector>,
        host: Arc<dyn HostPort>,
        reconnect: Arc<dyn ReconnectPolicy>,
    ) -> (Self, EventPump) {
        let (events_tx, rx) = mpsc::unbounded_channel();
        let bridge = Self {
            shared: Arc::new(Shared {
                config,
                connector,
                host,
                reconnect,
                events_tx,
                state: Arc::new(AtomicU8::new(BridgeState::Idle.to_u8())),
                counters: Counters::default(),
                shutdown: CancellationToken::new(),
                inner: Mutex::new(Inner {
                    state: BridgeState::Idle,
                    handle: None,
                    last_handle_id: 0,
                    pending_join: None,
                    reconnect_attempts: 0,
                    pending_reconnect: None,
                }),
            }),
        };
        let pump = EventPump {
            bridge: bridge.clone(),
            rx,
        };
        (bridge, pump)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    pub fn observer(&self) -> BridgeStateObserver {
        BridgeStateObserver::new(Arc::clone(&self.shared.state))
    }

    pub fn stats(&self) -> BridgeStats {
        let counters = &self.shared.counters;
        BridgeStats {
            protocol_errors: counters.protocol_errors.load(Ordering::SeqCst),
            usage_errors: counters.usage_errors.load(Ordering::SeqCst),
            stale_events: counters.stale_events.load(Ordering::SeqCst),
        }
    }

    /// The middleware to install in the host store.
    ///
    /// Empty actions are dropped, `server`-tagged actions go to the socket,
    /// and everything else is passed to `next` unchanged. Connect and
    /// disconnect actions are acted on before being passed along.
    pub fn as_dispatch_interceptor(&self) -> Middleware {
        let bridge = self.clone();
        Box::new(move |next: Dispatch| -> Dispatch {
            Arc::new(move |action: Option<Action>| bridge.intercept(action, &next))
        })
    }

    /// Close the socket and stop the event pump and any pending reconnect.
    pub fn shutdown(&self) {
        self.disconnect();
        self.shared.shutdown.cancel();
    }

    fn intercept(&self, action: Option<Action>, next: &Dispatch) {
        match router::route(action.as_ref()) {
            Route::Ignored => tracing::trace!("Dropping empty action"),
            Route::Outbound => {
                if let Some(action) = action {
                    self.send_outbound(action.into_server_payload());
                }
            }
            Route::Local => {
                if let Some(action) = &action {
                    if action.is(action_types::WS_CONNECT) {
                        self.connect();
                    } else if action.is(action_types::WS_DISCONNECT) {
                        self.disconnect();
                    }
                }
                next(action);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, new_state: BridgeState) {
        if inner.state != new_state {
            tracing::debug!(from = ?inner.state, to = ?new_state, "Bridge state change");
        }
        inner.state = new_state;
        store_state(&self.shared.state, new_state);
    }

    fn connect(&self) {
        let mut inner = self.lock();
        if !inner.state.can_connect() {
            tracing::warn!(state = ?inner.state, "Connect ignored: connection already active");
            return;
        }
        if let Some(pending) = inner.pending_reconnect.take() {
            pending.cancel();
        }
        if let Some(stale) = inner.handle.take() {
            stale.close();
        }

        inner.last_handle_id += 1;
        let handle_id = inner.last_handle_id;
        let events = SocketEvents::new(handle_id, self.shared.events_tx.clone());

        tracing::info!(handle_id, url = %self.shared.config.url, "Connecting to game server");
        self.set_state(&mut inner, BridgeState::Connecting);
        inner.pending_join = None;
        inner.handle = Some(self.shared.connector.open(&self.shared.config.url, events));
    }

    fn disconnect(&self) {
        let mut inner = self.lock();
        if let Some(pending) = inner.pending_reconnect.take() {
            pending.cancel();
        }
        let handle = inner.handle.take();
        if handle.is_none() && inner.state == BridgeState::Disconnected {
            tracing::debug!("Disconnect ignored: already disconnected");
            return;
        }
        if let Some(handle) = handle {
            tracing::info!(
                handle_id = handle.id(),
                address = %handle.address(),
                socket_state = ?handle.state(),
                state = ?inner.state,
                "Closing game connection"
            );
            handle.close();
        }
        self.set_state(&mut inner, BridgeState::Disconnected);
    }

    fn send_outbound(&self, payload: Map<String, Value>) {
        let message = match OutboundMessage::try_from(payload) {
            Ok(message) => message,
            Err(e) => {
                self.record_usage_error(&BridgeError::usage(format!(
                    "malformed outbound message: {e}"
                )));
                return;
            }
        };

        let inner = self.lock();
        if !inner.state.accepts_outbound() {
            self.record_usage_error(&BridgeError::usage(format!(
                "no joined socket to send `{}` (state {:?})",
                message.kind().unwrap_or("untagged"),
                inner.state
            )));
            return;
        }
        let Some(handle) = inner.handle.as_ref() else {
            self.record_usage_error(&BridgeError::usage("no socket to send on"));
            return;
        };

        tracing::debug!(handle_id = handle.id(), kind = ?message.kind(), "Forwarding action to server");
        if let Err(e) = handle.send(message) {
            self.record_usage_error(&e);
        }
    }

    fn record_usage_error(&self, err: &BridgeError) {
        self.shared
            .counters
            .usage_errors
            .fetch_add(1, Ordering::SeqCst);
        tracing::warn!(error = %err, "Dropping outbound message");
    }

    fn record_protocol_error(&self, handle_id: HandleId, err: &BridgeError) {
        self.shared
            .counters
            .protocol_errors
            .fetch_add(1, Ordering::SeqCst);
        tracing::warn!(handle_id, error = %err, "Ignoring inbound message");
    }

    /// Apply one socket event. Host dispatches happen after the bridge lock is
    /// released, since the host chain re-enters the interceptor.
    pub(crate) fn handle_socket_event(&self, envelope: SocketEnvelope) {
        let SocketEnvelope { handle_id, event } = envelope;

        // Read before locking: the getter may take the host's own lock.
        let session = match event {
            SocketEvent::Opened => Some(self.shared.host.session()),
            _ => None,
        };

        let mut outbox = Vec::new();
        let mut reconnect = None;
        {
            let mut inner = self.lock();
            let is_current = inner
                .handle
                .as_ref()
                .is_some_and(|handle| handle.id() == handle_id);
            if !is_current {
                if let SocketEvent::Closed { .. } = event {
                    tracing::trace!(handle_id, "Released socket finished closing");
                } else {
                    self.shared
                        .counters
                        .stale_events
                        .fetch_add(1, Ordering::SeqCst);
                    tracing::debug!(handle_id, event = ?event, "Dropping event from released socket");
                }
                return;
            }

            match event {
                SocketEvent::Opened => {
                    self.on_opened(&mut inner, session.unwrap_or_default())
                }
                SocketEvent::Message(text) => {
                    self.on_message(&mut inner, handle_id, &text, &mut outbox)
                }
                SocketEvent::Failed(err) | SocketEvent::Closed { error: Some(err) } => {
                    reconnect = self.on_transport_error(&mut inner, handle_id, err, &mut outbox)
                }
                SocketEvent::Closed { error: None } => {
                    tracing::info!(handle_id, "Game connection closed");
                    inner.handle = None;
                    self.set_state(&mut inner, BridgeState::Disconnected);
                    outbox.push(Action::closed());
                }
            }
        }

        for action in outbox {
            self.shared.host.dispatch(action);
        }
        if let Some(pending) = reconnect {
            self.spawn_reconnect(pending);
        }
    }

    fn on_opened(&self, inner: &mut Inner, session: SessionState) {
        if inner.state != BridgeState::Connecting {
            tracing::debug!(state = ?inner.state, "Ignoring open notification");
            return;
        }

        // The server admits a socket only after an `init` on it, so an
        // established session rejoins its game by key like an invite does.
        let join = match session.join_key {
            Some(join_key) => {
                tracing::info!(%join_key, "Session already established; rejoining");
                Some(join_key)
            }
            None => self.shared.config.invite_key.clone(),
        };

        self.set_state(inner, BridgeState::Joining);
        inner.pending_join = join.clone();
        let sent = OutboundMessage::try_from(ClientMessage::Init { join })
            .map_err(BridgeError::from)
            .and_then(|message| match inner.handle.as_ref() {
                Some(handle) => {
                    tracing::debug!(
                        handle_id = handle.id(),
                        address = %handle.address(),
                        "Sending join request"
                    );
                    handle.send(message)
                }
                None => Err(BridgeError::usage("no socket to send join request on")),
            });
        if let Err(e) = sent {
            self.record_usage_error(&e);
        }
    }

    fn on_message(
        &self,
        inner: &mut Inner,
        handle_id: HandleId,
        text: &str,
        outbox: &mut Vec<Action>,
    ) {
        if !inner.state.accepts_outbound() {
            tracing::debug!(handle_id, state = ?inner.state, "Dropping message outside a session");
            return;
        }

        let inbound = match InboundMessage::parse(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.record_protocol_error(handle_id, &BridgeError::from(e));
                return;
            }
        };
        tracing::debug!(handle_id, kind = ?inbound.kind, "recv");

        match router::classify_inbound(&inbound) {
            Inbound::Recognized(message) => {
                self.on_server_message(inner, handle_id, message, outbox)
            }
            Inbound::Unrecognized(kind) => self.record_protocol_error(
                handle_id,
                &BridgeError::protocol(format!("unrecognized kind `{kind}`")),
            ),
            Inbound::Malformed(err) => self.record_protocol_error(handle_id, &err),
        }
    }

    fn on_server_message(
        &self,
        inner: &mut Inner,
        handle_id: HandleId,
        message: ServerMessage,
        outbox: &mut Vec<Action>,
    ) {
        match &message {
            ServerMessage::Init { join: Some(join_key) } if !join_key.is_empty() => {
                if inner.state == BridgeState::Joined {
                    tracing::debug!(handle_id, "Ignoring repeated init; session already established");
                    return;
                }
                self.establish(inner, join_key, outbox);
                outbox.push(Action::tick());
                return;
            }
            ServerMessage::Init { .. } => {
                self.record_protocol_error(
                    handle_id,
                    &BridgeError::protocol("init without a join key"),
                );
                return;
            }
            ServerMessage::Joined { .. } if inner.state == BridgeState::Joining => {
                if let Some(join_key) = inner.pending_join.take() {
                    self.establish(inner, &join_key, outbox);
                }
            }
            _ => {}
        }

        if let Some(action) = message_translator::translate(&message) {
            outbox.push(action);
            outbox.push(Action::tick());
        }
    }

    fn establish(&self, inner: &mut Inner, join_key: &str, outbox: &mut Vec<Action>) {
        tracing::info!(%join_key, "Game session established");
        self.set_state(inner, BridgeState::Joined);
        inner.reconnect_attempts = 0;
        outbox.push(Action::session_established(
            join_key,
            &self.shared.config.url,
        ));
    }

    fn on_transport_error(
        &self,
        inner: &mut Inner,
        handle_id: HandleId,
        err: BridgeError,
        outbox: &mut Vec<Action>,
    ) -> Option<PendingReconnect> {
        tracing::error!(handle_id, error = %err, "Game connection lost");
        if let Some(handle) = inner.handle.take() {
            handle.close();
        }
        self.set_state(inner, BridgeState::Disconnected);
        outbox.push(Action::diagnostic(&err));
        self.plan_reconnect(inner)
    }

    fn plan_reconnect(&self, inner: &mut Inner) -> Option<PendingReconnect> {
        let attempt = inner.reconnect_attempts;
        let delay = self.shared.reconnect.next_delay(attempt)?;
        inner.reconnect_attempts += 1;

        let cancel = self.shared.shutdown.child_token();
        inner.pending_reconnect = Some(cancel.clone());
        Some(PendingReconnect {
            attempt: attempt + 1,
            delay,
            cancel,
        })
    }

    /// Start the reconnect timer. Needs a tokio runtime; without one the
    /// reconnect is skipped and the host has to dispatch connect itself.
    fn spawn_reconnect(&self, pending: PendingReconnect) {
        let PendingReconnect {
            attempt,
            delay,
            cancel,
        } = pending;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(attempt, error = %e, "No async runtime; skipping reconnect");
                cancel.cancel();
                return;
            }
        };

        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        let host = Arc::clone(&self.shared.host);
        runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => host.dispatch(Action::connect()),
            }
        });
    }
}

struct PendingReconnect {
    attempt: u32,
    delay: Duration,
    cancel: CancellationToken,
}

impl EventPump {
    /// Process events until the bridge is shut down.
    pub async fn run(mut self) {
        let shutdown = self.bridge.shared.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                envelope = self.rx.recv() => match envelope {
                    Some(envelope) => self.bridge.handle_socket_event(envelope),
                    None => break,
                },
            }
        }
        tracing::debug!("Bridge event pump stopped");
    }

    /// Process every event already queued. Returns how many were handled.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            self.bridge.handle_socket_event(envelope);
            handled += 1;
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::testing::{FakeConnector, FakeSocket, RecordingHost};
    use crate::infrastructure::websocket::{ExponentialBackoff, GameCommands};
    use crate::ports::outbound::{MockHostPort, MockSocketConnector, MockSocketHandle};
    use crate::state::{app_reducer, AppState, Store, StoreHost};
    use serde_json::json;

    const URL: &str = "ws://localhost:8765";

    struct Harness {
        store: Store<AppState>,
        bridge: Bridge,
        pump: EventPump,
        connector: FakeConnector,
        seen: Arc<Mutex<Vec<Option<Action>>>>,
    }

    impl Harness {
        fn new(config: BridgeConfig) -> Self {
            Self::with_policy(config, Arc::new(NeverReconnect))
        }

        fn with_policy(config: BridgeConfig, policy: Arc<dyn ReconnectPolicy>) -> Self {
            let store = Store::new(app_reducer, AppState::default());
            let connector = FakeConnector::new();
            let host = Arc::new(StoreHost::new(&store, |state: &AppState| {
                state.session.clone()
            }));
            let (bridge, pump) =
                Bridge::with_reconnect_policy(config, Arc::new(connector.clone()), host, policy);
            let seen = Arc::new(Mutex::new(Vec::new()));
            store
                .apply_middleware(vec![
                    bridge.as_dispatch_interceptor(),
                    capture(Arc::clone(&seen)),
                ])
                .unwrap();
            Self {
                store,
                bridge,
                pump,
                connector,
                seen,
            }
        }

        fn dispatch(&self, action: Action) {
            self.store.dispatch(Some(action));
        }

        fn socket(&self) -> FakeSocket {
            self.connector.last().expect("a socket was opened")
        }

        /// Connect and complete the `init` handshake.
        fn joined(config: BridgeConfig) -> Self {
            let mut harness = Self::new(config);
            harness.dispatch(Action::connect());
            harness.socket().open();
            harness.pump.drain();
            harness
                .socket()
                .receive_json(json!({ "kind": "init", "join": "abc123" }));
            harness.pump.drain();
            assert_eq!(harness.bridge.state(), BridgeState::Joined);
            harness
        }

        /// Actions that made it past the bridge.
        fn seen(&self) -> Vec<Option<Action>> {
            self.seen.lock().unwrap().clone()
        }

        fn seen_of(&self, action_type: &str) -> Vec<Action> {
            self.seen()
                .into_iter()
                .flatten()
                .filter(|action| action.is(action_type))
                .collect()
        }

        fn join_key(&self) -> Option<String> {
            self.store.get_state().session.join_key
        }
    }

    fn capture(seen: Arc<Mutex<Vec<Option<Action>>>>) -> Middleware {
        Box::new(move |next: Dispatch| -> Dispatch {
            Arc::new(move |action: Option<Action>| {
                seen.lock().unwrap().push(action.clone());
                next(action);
            })
        })
    }

    fn server_action(value: Value) -> Action {
        Action::server(value.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_local_action_passes_through_unchanged() {
        let harness = Harness::new(BridgeConfig::new(URL));
        let action = Action::new("ui/selectCard").with("cardId", "c1");

        harness.dispatch(action.clone());

        assert_eq!(harness.seen(), vec![Some(action)]);
        assert_eq!(harness.connector.opened_count(), 0);
    }

    #[test]
    fn test_empty_action_is_dropped() {
        let harness = Harness::new(BridgeConfig::new(URL));

        harness.store.dispatch(None);

        assert!(harness.seen().is_empty());
    }

    #[test]
    fn test_server_action_is_dropped_while_idle() {
        let harness = Harness::new(BridgeConfig::new(URL));

        harness.dispatch(server_action(json!({ "move": "draw" })));

        assert!(harness.seen().is_empty());
        assert_eq!(harness.bridge.stats().usage_errors, 1);
    }

    #[test]
    fn test_nothing_is_sent_while_connecting() {
        let mut handle = MockSocketHandle::new();
        handle.expect_id().return_const(1u64);
        handle.expect_send().never();

        let mut connector = MockSocketConnector::new();
        connector
            .expect_open()
            .times(1)
            .return_once(move |_, _| Box::new(handle) as Box<dyn SocketHandle>);

        let mut host = MockHostPort::new();
        host.expect_dispatch().never();

        let (bridge, _pump) =
            Bridge::new(BridgeConfig::new(URL), Arc::new(connector), Arc::new(host));
        let intercept = (bridge.as_dispatch_interceptor())(Arc::new(|_: Option<Action>| {}));

        intercept(Some(Action::connect()));
        assert_eq!(bridge.state(), BridgeState::Connecting);

        intercept(Some(GameCommands::begin()));
        assert_eq!(bridge.stats().usage_errors, 1);
    }

    #[test]
    fn test_init_handshake_establishes_session_once() {
        let mut harness = Harness::new(BridgeConfig::new(URL));

        harness.dispatch(Action::connect());
        assert_eq!(harness.bridge.state(), BridgeState::Connecting);

        harness.socket().open();
        harness.pump.drain();
        assert_eq!(harness.bridge.state(), BridgeState::Joining);
        assert_eq!(harness.socket().sent_payloads(), vec![json!({ "kind": "init" })]);

        harness
            .socket()
            .receive_json(json!({ "kind": "init", "join": "abc123" }));
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Joined);
        assert_eq!(harness.join_key().as_deref(), Some("abc123"));

        let established = harness.seen_of(action_types::SESSION_ESTABLISHED);
        assert_eq!(established.len(), 1);
        assert_eq!(established[0].get_str("joinKey"), Some("abc123"));
        assert_eq!(established[0].get_str("endpoint"), Some(URL));
        assert_eq!(
            harness.seen().last().cloned().flatten(),
            Some(Action::tick())
        );
    }

    #[test]
    fn test_handshake_dispatches_exactly_one_session_update() {
        let connector = FakeConnector::new();
        let mut host = MockHostPort::new();
        host.expect_session().return_const(SessionState::default());
        host.expect_dispatch()
            .withf(|action| action.is(action_types::SESSION_ESTABLISHED))
            .times(1)
            .return_const(());
        host.expect_dispatch()
            .withf(|action| action.is(action_types::TICK))
            .times(1)
            .return_const(());

        let (bridge, mut pump) = Bridge::new(
            BridgeConfig::new(URL),
            Arc::new(connector.clone()),
            Arc::new(host),
        );
        let intercept = (bridge.as_dispatch_interceptor())(Arc::new(|_: Option<Action>| {}));

        intercept(Some(Action::connect()));
        let socket = connector.last().expect("socket");
        socket.open();
        socket.receive_json(json!({ "kind": "init", "join": "abc123" }));
        pump.drain();

        assert!(bridge.observer().is_joined());
    }

    #[test]
    fn test_repeated_init_is_ignored() {
        let mut harness = Harness::joined(BridgeConfig::new(URL));

        harness
            .socket()
            .receive_json(json!({ "kind": "init", "join": "other" }));
        harness.pump.drain();

        assert_eq!(harness.join_key().as_deref(), Some("abc123"));
        assert_eq!(harness.seen_of(action_types::SESSION_ESTABLISHED).len(), 1);
        assert_eq!(harness.bridge.state(), BridgeState::Joined);
    }

    #[test]
    fn test_server_action_is_forwarded_without_tag() {
        let harness = Harness::joined(BridgeConfig::new(URL));

        harness.dispatch(server_action(json!({ "move": "draw" })));

        let sent = harness.socket().sent_payloads();
        assert_eq!(sent.last(), Some(&json!({ "move": "draw" })));
        assert!(harness.seen_of(action_types::SERVER).is_empty());
    }

    #[test]
    fn test_game_commands_reach_the_socket_in_order() {
        let harness = Harness::joined(BridgeConfig::new(URL));

        harness.dispatch(GameCommands::begin());
        harness.dispatch(GameCommands::bet(&["m1", "m2"]));
        harness.dispatch(GameCommands::play_card("c7", None));

        assert_eq!(
            harness.socket().sent_payloads(),
            vec![
                json!({ "kind": "init" }),
                json!({ "kind": "begin" }),
                json!({ "kind": "bet", "monster_ids": ["m1", "m2"] }),
                json!({ "kind": "action", "card_id": "c7" }),
            ]
        );
    }

    #[test]
    fn test_malformed_outbound_is_dropped() {
        let harness = Harness::joined(BridgeConfig::new(URL));

        harness.dispatch(Action::new(action_types::SERVER));
        harness.dispatch(server_action(json!({ "kind": "" })));

        assert_eq!(harness.socket().sent_payloads().len(), 1);
        assert_eq!(harness.bridge.stats().usage_errors, 2);
    }

    #[test]
    fn test_game_messages_are_dispatched_with_tick() {
        let mut harness = Harness::joined(BridgeConfig::new(URL));
        let before = harness.seen().len();

        harness.socket().receive_json(json!({
            "kind": "state",
            "game": { "round": 2 }
        }));
        harness.pump.drain();

        let after: Vec<Action> = harness.seen()[before..].iter().flatten().cloned().collect();
        assert_eq!(after.len(), 2);
        assert!(after[0].is("game/state"));
        assert_eq!(after[0].payload.get("game"), Some(&json!({ "round": 2 })));
        assert_eq!(after[1], Action::tick());
    }

    #[test]
    fn test_unrecognized_and_malformed_inbound_are_ignored() {
        let mut harness = Harness::joined(BridgeConfig::new(URL));
        let before = harness.seen().len();

        harness.socket().receive("not json");
        harness.socket().receive_json(json!({ "kind": "teleport" }));
        harness.socket().receive_json(json!({ "count": 3 }));
        harness.socket().receive_json(json!([1, 2, 3]));
        harness.pump.drain();

        assert_eq!(harness.seen().len(), before);
        assert_eq!(harness.bridge.stats().protocol_errors, 4);
        assert_eq!(harness.bridge.state(), BridgeState::Joined);
    }

    #[test]
    fn test_init_without_join_key_is_a_protocol_error() {
        let mut harness = Harness::new(BridgeConfig::new(URL));
        harness.dispatch(Action::connect());
        harness.socket().open();
        harness.socket().receive_json(json!({ "kind": "init" }));
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Joining);
        assert_eq!(harness.join_key(), None);
        assert_eq!(harness.bridge.stats().protocol_errors, 1);
    }

    #[test]
    fn test_connect_while_active_is_ignored() {
        let mut harness = Harness::new(BridgeConfig::new(URL));

        harness.dispatch(Action::connect());
        harness.dispatch(Action::connect());
        harness.socket().open();
        harness.pump.drain();
        harness.dispatch(Action::connect());

        assert_eq!(harness.connector.opened_count(), 1);
        assert_eq!(harness.bridge.state(), BridgeState::Joining);
        // Control actions still reach the rest of the chain.
        assert_eq!(harness.seen_of(action_types::WS_CONNECT).len(), 3);
    }

    #[test]
    fn test_double_disconnect_closes_once() {
        let mut harness = Harness::joined(BridgeConfig::new(URL));

        harness.dispatch(Action::disconnect());
        harness.dispatch(Action::disconnect());
        harness.pump.drain();

        assert_eq!(harness.socket().close_calls(), 1);
        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);
        assert!(harness.seen_of(action_types::CLOSED).is_empty());
        assert_eq!(harness.seen_of(action_types::WS_DISCONNECT).len(), 2);
        // The join key survives; only the endpoint is dropped.
        let session = harness.store.get_state().session;
        assert_eq!(session.join_key.as_deref(), Some("abc123"));
        assert!(!session.is_connected());
    }

    #[test]
    fn test_open_failure_ends_disconnected_without_join() {
        let mut harness = Harness::new(BridgeConfig::new(URL));

        harness.dispatch(Action::connect());
        harness.socket().fail("connection refused");
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);
        assert!(harness.socket().sent_payloads().is_empty());
        let diagnostics = harness.seen_of(action_types::DIAGNOSTIC);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].get_str("error"), Some("transport"));
    }

    #[test]
    fn test_disconnect_mid_handshake_drops_late_messages() {
        let mut harness = Harness::new(BridgeConfig::new(URL));
        harness.dispatch(Action::connect());
        harness.socket().open();
        harness.pump.drain();
        assert_eq!(harness.bridge.state(), BridgeState::Joining);

        harness.dispatch(Action::disconnect());
        harness
            .socket()
            .receive_json(json!({ "kind": "init", "join": "abc123" }));
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);
        assert_eq!(harness.socket().close_calls(), 1);
        assert_eq!(harness.join_key(), None);
        assert!(harness.seen_of(action_types::SESSION_ESTABLISHED).is_empty());
    }

    #[test]
    fn test_events_from_superseded_handle_are_dropped() {
        let mut harness = Harness::new(BridgeConfig::new(URL));
        harness.dispatch(Action::connect());
        let first = harness.socket();
        harness.dispatch(Action::disconnect());
        harness.dispatch(Action::connect());
        let second = harness.socket();
        assert_ne!(first.id(), second.id());

        harness.bridge.handle_socket_event(SocketEnvelope {
            handle_id: first.id(),
            event: SocketEvent::Opened,
        });
        harness.bridge.handle_socket_event(SocketEnvelope {
            handle_id: first.id(),
            event: SocketEvent::Message(json!({ "kind": "init", "join": "old" }).to_string()),
        });
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Connecting);
        assert_eq!(harness.join_key(), None);
        assert_eq!(harness.bridge.stats().stale_events, 2);
        assert_eq!(harness.connector.sockets().len(), 2);
    }

    #[test]
    fn test_clean_server_close_dispatches_closed() {
        let mut harness = Harness::joined(BridgeConfig::new(URL));

        harness.socket().server_close();
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);
        assert_eq!(harness.seen_of(action_types::CLOSED).len(), 1);
        assert!(harness.seen_of(action_types::DIAGNOSTIC).is_empty());
    }

    #[test]
    fn test_connection_loss_dispatches_diagnostic_and_allows_reconnect() {
        let mut harness = Harness::joined(BridgeConfig::new(URL));

        harness.socket().drop_connection("reset by peer");
        harness.pump.drain();
        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);
        assert_eq!(harness.seen_of(action_types::DIAGNOSTIC).len(), 1);
        // No automatic reconnect by default.
        assert_eq!(harness.connector.opened_count(), 1);

        harness.dispatch(Action::connect());
        assert_eq!(harness.connector.opened_count(), 2);
        assert_eq!(harness.bridge.state(), BridgeState::Connecting);
    }

    #[test]
    fn test_existing_session_rejoins_by_key() {
        let mut harness = Harness::joined(BridgeConfig::new(URL));
        harness.dispatch(Action::disconnect());
        harness.pump.drain();

        harness.dispatch(Action::connect());
        harness.socket().open();
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Joining);
        assert_eq!(
            harness.socket().sent_payloads(),
            vec![json!({ "kind": "init", "join": "abc123" })]
        );
        assert_eq!(harness.seen_of(action_types::SESSION_ESTABLISHED).len(), 1);

        harness
            .socket()
            .receive_json(json!({ "kind": "joined", "player_id": 1 }));
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Joined);
        assert_eq!(harness.join_key().as_deref(), Some("abc123"));
        assert_eq!(harness.seen_of(action_types::SESSION_ESTABLISHED).len(), 2);
        assert!(harness.store.get_state().session.is_connected());
    }

    #[test]
    fn test_open_with_known_join_key_sends_join_request() {
        let connector = FakeConnector::new();
        let host = Arc::new(RecordingHost::with_join_key("abc123"));
        let (bridge, mut pump) = Bridge::new(
            BridgeConfig::new(URL),
            Arc::new(connector.clone()),
            Arc::clone(&host) as Arc<dyn HostPort>,
        );
        let intercept = (bridge.as_dispatch_interceptor())(Arc::new(|_: Option<Action>| {}));

        intercept(Some(Action::connect()));
        let socket = connector.last().expect("socket");
        socket.open();
        pump.drain();

        assert_eq!(bridge.state(), BridgeState::Joining);
        assert_eq!(
            socket.sent_payloads(),
            vec![json!({ "kind": "init", "join": "abc123" })]
        );
        assert!(host.actions().is_empty());

        // Commands sent before the server answers still go out on this socket.
        intercept(Some(GameCommands::request_state()));
        assert_eq!(socket.sent_payloads().len(), 2);

        socket.receive_json(json!({ "kind": "joined", "player_id": 1 }));
        pump.drain();

        assert_eq!(bridge.state(), BridgeState::Joined);
        let established = host.actions_of(action_types::SESSION_ESTABLISHED);
        assert_eq!(established.len(), 1);
        assert_eq!(established[0].get_str("joinKey"), Some("abc123"));
        assert_eq!(host.actions_of("game/joined").len(), 1);
    }

    #[test]
    fn test_handshake_accepts_join_key_field() {
        let mut harness = Harness::new(BridgeConfig::new(URL));
        harness.dispatch(Action::connect());
        harness.socket().open();
        harness
            .socket()
            .receive_json(json!({ "kind": "init", "join_key": "abc123" }));
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Joined);
        assert_eq!(harness.join_key().as_deref(), Some("abc123"));
        assert_eq!(harness.seen_of(action_types::SESSION_ESTABLISHED).len(), 1);
    }

    #[test]
    fn test_backoff_without_runtime_still_reports_failure() {
        let mut harness = Harness::with_policy(BridgeConfig::new(URL), fast_backoff());

        harness.dispatch(Action::connect());
        harness.socket().fail("connection refused");
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);
        assert_eq!(harness.seen_of(action_types::DIAGNOSTIC).len(), 1);
        assert_eq!(harness.connector.opened_count(), 1);

        // A manual connect still works.
        harness.dispatch(Action::connect());
        assert_eq!(harness.connector.opened_count(), 2);
    }

    #[test]
    fn test_invite_join_completes_on_joined() {
        let config = BridgeConfig {
            url: URL.to_string(),
            invite_key: Some("xyz789".to_string()),
        };
        let mut harness = Harness::new(config);

        harness.dispatch(Action::connect());
        harness.socket().open();
        harness.pump.drain();
        assert_eq!(
            harness.socket().sent_payloads(),
            vec![json!({ "kind": "init", "join": "xyz789" })]
        );

        harness
            .socket()
            .receive_json(json!({ "kind": "joined", "player_id": 2 }));
        harness.pump.drain();

        assert_eq!(harness.bridge.state(), BridgeState::Joined);
        assert_eq!(harness.join_key().as_deref(), Some("xyz789"));
        let joined = harness.seen_of("game/joined");
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].payload.get("playerId"), Some(&json!(2)));
    }

    #[test]
    fn test_recording_host_sees_failure_diagnostic() {
        let connector = FakeConnector::new();
        let host = Arc::new(RecordingHost::new());
        let (bridge, mut pump) = Bridge::new(
            BridgeConfig::new(URL),
            Arc::new(connector.clone()),
            Arc::clone(&host) as Arc<dyn HostPort>,
        );
        let intercept = (bridge.as_dispatch_interceptor())(Arc::new(|_: Option<Action>| {}));

        intercept(Some(Action::connect()));
        connector.last().expect("socket").fail("no route to host");
        pump.drain();

        assert_eq!(host.actions().len(), 1);
        assert_eq!(host.actions_of(action_types::DIAGNOSTIC).len(), 1);
        // The failed socket's own final close is expected, not stale.
        assert_eq!(bridge.stats().stale_events, 0);
    }

    fn fast_backoff() -> Arc<dyn ReconnectPolicy> {
        Arc::new(ExponentialBackoff {
            initial_delay_ms: 10,
            max_delay_ms: 50,
            max_attempts: 3,
            multiplier: 2.0,
        })
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_backoff_policy_reconnects_after_loss() {
        let mut harness = Harness::with_policy(BridgeConfig::new(URL), fast_backoff());
        harness.dispatch(Action::connect());
        harness.socket().open();
        harness.pump.drain();
        harness
            .socket()
            .receive_json(json!({ "kind": "init", "join": "abc123" }));
        harness.pump.drain();

        harness.socket().drop_connection("reset by peer");
        harness.pump.drain();
        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);

        let connector = harness.connector.clone();
        assert!(wait_for(|| connector.opened_count() == 2).await);
        assert_eq!(harness.bridge.state(), BridgeState::Connecting);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_reconnect() {
        let mut harness = Harness::with_policy(BridgeConfig::new(URL), fast_backoff());
        harness.dispatch(Action::connect());
        harness.socket().fail("connection refused");
        harness.pump.drain();

        harness.bridge.shutdown();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(harness.connector.opened_count(), 1);
        assert_eq!(harness.bridge.state(), BridgeState::Disconnected);
    }

    #[tokio::test]
    async fn test_event_pump_runs_until_shutdown() {
        let harness = Harness::new(BridgeConfig::new(URL));
        let Harness {
            store,
            bridge,
            pump,
            connector,
            ..
        } = harness;
        let task = tokio::spawn(pump.run());

        store.dispatch(Some(Action::connect()));
        let socket = connector.last().expect("socket");
        socket.open();
        socket.receive_json(json!({ "kind": "init", "join": "abc123" }));

        let observer = bridge.observer();
        assert!(wait_for(|| observer.is_joined()).await);

        bridge.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("pump stops")
            .expect("pump task");
        assert_eq!(socket.close_calls(), 1);
    }
}
