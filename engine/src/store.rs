//! Store - the observable local state container.
//!
//! The local store is the authoritative copy of application state. The sync
//! engine reads it, merges remote content into it, and listens to its change
//! notifications to decide when to push.

use crate::{PersistedState, Revision};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};

/// A change notification delivered to store listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Revision produced by the `set_state` call that caused this change
    pub revision: Revision,
    /// Full state after the change
    pub state: PersistedState,
}

/// Callback invoked on every state change.
pub type Listener = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Handle returned by [`LocalStateStore::subscribe`].
///
/// Dropping the subscription unsubscribes the listener.
#[must_use = "dropping a subscription unsubscribes the listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap an unsubscribe callback.
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Stop receiving notifications. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// The local, in-process state store consumed by the sync engine.
pub trait LocalStateStore: Send + Sync + 'static {
    /// Snapshot of the current state.
    fn get_state(&self) -> PersistedState;

    /// Shallow-merge `partial` into the current state, notify subscribers,
    /// and return the revision of the resulting state.
    fn set_state(&self, partial: PersistedState) -> Revision;

    /// Register a listener for state changes.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

#[derive(Debug, Default)]
struct Snapshot {
    state: PersistedState,
    revision: Revision,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// A thread-safe in-memory [`LocalStateStore`].
#[derive(Default)]
pub struct MemoryStateStore {
    snapshot: RwLock<Snapshot>,
    listeners: Arc<Mutex<Listeners>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `initial` at revision 0.
    pub fn with_state(initial: PersistedState) -> Self {
        Self {
            snapshot: RwLock::new(Snapshot {
                state: initial,
                revision: 0,
            }),
            listeners: Arc::default(),
        }
    }

    /// Current revision.
    pub fn revision(&self) -> Revision {
        self.snapshot.read().revision
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }
}

impl LocalStateStore for MemoryStateStore {
    fn get_state(&self) -> PersistedState {
        self.snapshot.read().state.clone()
    }

    fn set_state(&self, partial: PersistedState) -> Revision {
        let change = {
            let mut snapshot = self.snapshot.write();
            for (key, value) in partial {
                snapshot.state.insert(key, value);
            }
            snapshot.revision += 1;
            StateChange {
                revision: snapshot.revision,
                state: snapshot.state.clone(),
            }
        };

        // Listeners run outside both locks so they may read the store.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&change);
        }

        change.revision
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, listener));
            id
        };

        let registry: Weak<Mutex<Listeners>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.lock().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }
}

impl std::fmt::Debug for MemoryStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStateStore")
            .field("snapshot", &*self.snapshot.read())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(value: serde_json::Value) -> PersistedState {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn set_state_shallow_merges() {
        let store = MemoryStateStore::with_state(state(json!({"a": 1, "b": {"c": 2}})));

        store.set_state(state(json!({"b": {"d": 3}, "e": 4})));

        assert_eq!(
            serde_json::Value::Object(store.get_state()),
            json!({"a": 1, "b": {"d": 3}, "e": 4})
        );
    }

    #[test]
    fn revisions_increase() {
        let store = MemoryStateStore::new();
        assert_eq!(store.revision(), 0);

        let r1 = store.set_state(state(json!({"a": 1})));
        let r2 = store.set_state(state(json!({"a": 2})));

        assert!(r2 > r1);
        assert_eq!(store.revision(), r2);
    }

    #[test]
    fn listeners_receive_changes() {
        let store = MemoryStateStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _subscription = store.subscribe(Arc::new(move |change: &StateChange| {
            sink.lock().push(change.clone());
        }));

        let revision = store.set_state(state(json!({"a": 1})));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].revision, revision);
        assert_eq!(seen[0].state, state(json!({"a": 1})));
    }

    #[test]
    fn drop_unsubscribes() {
        let store = MemoryStateStore::new();
        let count = Arc::new(Mutex::new(0));

        let counter = count.clone();
        let subscription = store.subscribe(Arc::new(move |_: &StateChange| {
            *counter.lock() += 1;
        }));
        assert_eq!(store.listener_count(), 1);

        store.set_state(state(json!({"a": 1})));
        drop(subscription);
        store.set_state(state(json!({"a": 2})));

        assert_eq!(*count.lock(), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let store = MemoryStateStore::new();
        let mut subscription = store.subscribe(Arc::new(|_: &StateChange| {}));

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn listener_may_read_store() {
        let store = Arc::new(MemoryStateStore::new());
        let observed = Arc::new(Mutex::new(None));

        let reader = Arc::downgrade(&store);
        let sink = observed.clone();
        let _subscription = store.subscribe(Arc::new(move |_: &StateChange| {
            if let Some(store) = reader.upgrade() {
                *sink.lock() = Some(store.get_state());
            }
        }));

        store.set_state(state(json!({"k": "v"})));
        assert_eq!(*observed.lock(), Some(state(json!({"k": "v"}))));
    }
}
