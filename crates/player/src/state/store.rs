//! Action store with a middleware chain.
//!
//! Dispatch runs `middleware[0] -> middleware[1] -> ... -> reducer`. Each
//! middleware receives the rest of the chain (`next`) and returns its own
//! dispatch function, so it can forward, transform or drop actions.
//! Dispatching `None` is allowed; the base dispatcher ignores it.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use anyhow::{bail, Result};

use super::action::Action;
use super::session_state::SessionState;
use crate::ports::outbound::HostPort;

/// A dispatch function: the head of (a suffix of) the middleware chain.
pub type Dispatch = Arc<dyn Fn(Option<Action>) + Send + Sync>;

/// Given the rest of the chain, produce this middleware's dispatch function.
pub type Middleware = Box<dyn FnOnce(Dispatch) -> Dispatch + Send>;

pub type Reducer<S> = fn(&mut S, &Action);

type Subscriber<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct Shared<S> {
    state: Mutex<S>,
    reducer: Reducer<S>,
    chain: OnceLock<Dispatch>,
    subscribers: Mutex<Vec<Subscriber<S>>>,
}

/// Cheaply cloneable handle to a store.
pub struct Store<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Clone + Send + 'static> Store<S> {
    pub fn new(reducer: Reducer<S>, initial: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(initial),
                reducer,
                chain: OnceLock::new(),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Install the middleware chain. Can only be done once.
    ///
    /// Until this is called, dispatch goes straight to the reducer.
    pub fn apply_middleware(&self, middleware: Vec<Middleware>) -> Result<()> {
        let mut dispatch = base_dispatch(Arc::downgrade(&self.shared));
        for layer in middleware.into_iter().rev() {
            dispatch = layer(dispatch);
        }
        if self.shared.chain.set(dispatch).is_err() {
            bail!("middleware already applied to this store");
        }
        Ok(())
    }

    pub fn dispatch(&self, action: Option<Action>) {
        match self.shared.chain.get() {
            Some(chain) => chain(action),
            None => reduce(&self.shared, action),
        }
    }

    /// Snapshot of the current state.
    pub fn get_state(&self) -> S {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn select<T>(&self, selector: impl FnOnce(&S) -> T) -> T {
        let state = self.shared.state.lock().unwrap_or_else(|p| p.into_inner());
        selector(&state)
    }

    /// Register a callback invoked with the new state after every reduced action.
    pub fn subscribe(&self, subscriber: impl Fn(&S) + Send + Sync + 'static) {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::new(subscriber));
    }

    pub fn downgrade(&self) -> WeakStore<S> {
        WeakStore {
            shared: Arc::downgrade(&self.shared),
        }
    }
}

/// Non-owning store handle; dispatches become no-ops once the store is gone.
pub struct WeakStore<S> {
    shared: Weak<Shared<S>>,
}

impl<S> Clone for WeakStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Weak::clone(&self.shared),
        }
    }
}

impl<S: Clone + Send + 'static> WeakStore<S> {
    pub fn upgrade(&self) -> Option<Store<S>> {
        self.shared.upgrade().map(|shared| Store { shared })
    }
}

fn base_dispatch<S: Clone + Send + 'static>(shared: Weak<Shared<S>>) -> Dispatch {
    Arc::new(move |action| {
        if let Some(shared) = shared.upgrade() {
            reduce(&shared, action);
        }
    })
}

fn reduce<S: Clone>(shared: &Shared<S>, action: Option<Action>) {
    let Some(action) = action else {
        return;
    };

    let snapshot = {
        let mut state = shared.state.lock().unwrap_or_else(|p| p.into_inner());
        (shared.reducer)(&mut state, &action);
        state.clone()
    };

    // Clone the list so subscribers may dispatch without deadlocking.
    let subscribers: Vec<Subscriber<S>> = shared
        .subscribers
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .clone();
    for subscriber in subscribers {
        subscriber(&snapshot);
    }
}

/// Middleware that traces every action passing through the chain.
pub fn logging_middleware() -> Middleware {
    Box::new(|next: Dispatch| -> Dispatch {
        Arc::new(move |action: Option<Action>| {
            match &action {
                Some(action) => tracing::debug!(
                    action_type = %action.action_type,
                    payload = ?action.payload,
                    "dispatch"
                ),
                None => tracing::trace!("dispatch of empty action"),
            }
            next(action);
        })
    })
}

/// Exposes a store to the connection bridge as a [`HostPort`].
///
/// Holds the store weakly: the store's middleware chain owns the bridge, so a
/// strong reference here would keep both alive forever.
pub struct StoreHost<S> {
    store: WeakStore<S>,
    select_session: fn(&S) -> SessionState,
}

impl<S: Clone + Send + 'static> StoreHost<S> {
    pub fn new(store: &Store<S>, select_session: fn(&S) -> SessionState) -> Self {
        Self {
            store: store.downgrade(),
            select_session,
        }
    }
}

impl<S: Clone + Send + 'static> HostPort for StoreHost<S> {
    fn dispatch(&self, action: Action) {
        match self.store.upgrade() {
            Some(store) => store.dispatch(Some(action)),
            None => tracing::debug!(
                action_type = %action.action_type,
                "Store dropped; discarding action"
            ),
        }
    }

    fn session(&self) -> SessionState {
        self.store
            .upgrade()
            .map(|store| store.select(self.select_session))
            .unwrap_or_default()
    }
}
