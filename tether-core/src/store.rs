//! External application-state container seam.
//!
//! The store is owned outside the core and is redux-shaped: synchronous
//! reads, synchronous dispatch, and listeners that may fire synchronously
//! from inside `dispatch`. The core only ever touches it through
//! [`Store::state`], the listener subscription, and the [`Dispatcher`]
//! exposed in projected props.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Synchronous state container contract.
pub trait Store: Send + Sync {
    /// Current state snapshot.
    fn state(&self) -> Value;

    /// Apply an action and notify listeners. Returns the action.
    fn dispatch(&self, action: Value) -> Value;

    /// Register a change listener. Dropping the returned subscription (or
    /// calling `unsubscribe`) releases it.
    fn subscribe(&self, listener: Box<dyn Fn() + Send + Sync>) -> StoreSubscription;
}

/// Cloneable dispatch handle exposed through projected props.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn dispatch(&self, action: Value) -> Value {
        self.store.dispatch(action)
    }

    /// Identity comparison; a connector keeps one dispatcher for its
    /// lifetime, so projected dispatch entries compare stable.
    pub fn same_dispatcher(&self, other: &Dispatcher) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl PartialEq for Dispatcher {
    fn eq(&self, other: &Self) -> bool {
        self.same_dispatcher(other)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatcher")
    }
}

/// Releases a store listener when dropped.
pub struct StoreSubscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreSubscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;
type ListenerRegistry = Arc<Mutex<Vec<(u64, Listener)>>>;

/// Minimal reducer-driven store, suitable for tests and small hosts.
pub struct MemoryStore {
    reducer: Box<dyn Fn(&Value, &Value) -> Value + Send + Sync>,
    state: Mutex<Value>,
    listeners: ListenerRegistry,
    next_listener_id: AtomicU64,
}

impl MemoryStore {
    pub fn new(
        initial: Value,
        reducer: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            reducer: Box::new(reducer),
            state: Mutex::new(initial),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
        })
    }

    /// A store whose state never changes, regardless of dispatched actions.
    pub fn fixed(initial: Value) -> Arc<Self> {
        Self::new(initial, |state, _action| state.clone())
    }
}

impl Store for MemoryStore {
    fn state(&self) -> Value {
        self.state.lock().clone()
    }

    fn dispatch(&self, action: Value) -> Value {
        {
            let mut state = self.state.lock();
            *state = (self.reducer)(&state, &action);
        }
        // Listeners run with no lock held: one of them may dispatch again.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
        action
    }

    fn subscribe(&self, listener: Box<dyn Fn() + Send + Sync>) -> StoreSubscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::from(listener);
        self.listeners.lock().push((id, listener));

        let registry = Arc::clone(&self.listeners);
        StoreSubscription::new(move || {
            registry.lock().retain(|(entry_id, _)| *entry_id != id);
        })
    }
}
