// Counter state module
//
// This module provides the CounterStore which wraps CounterState with shared access
// and emits change events to whatever UI layer subscribes.

use crate::models::CounterState;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when the counter value is modified
///
/// Lock and unlock do not emit events; only actual value mutations do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CounterChange {
    /// The counter now holds `value`
    ValueChanged { value: i64 },
}

/// Observable counter store
///
/// - Holds a [`CounterState`] behind `Arc<RwLock<T>>` so clones share one counter
/// - Emits [`CounterChange`] on every successful mutation
/// - Supports subscribing via tokio broadcast channels
///
/// All mutation is expected to come from a single control thread (a UI
/// callback); the lock exists so that the store can be handed to a display
/// thread, not to arbitrate concurrent writers.
pub struct CounterStore {
    state: Arc<RwLock<CounterState>>,

    /// Broadcast channel for change events
    change_tx: broadcast::Sender<CounterChange>,
}

impl CounterStore {
    /// Create a store around the given counter
    ///
    /// # Returns
    /// A new CounterStore with a broadcast channel buffer of 100 events
    pub fn new(state: CounterState) -> Self {
        let (change_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(state)),
            change_tx,
        }
    }

    /// Clone of the current counter state
    pub fn snapshot(&self) -> CounterState {
        self.read(CounterState::clone)
    }

    /// Execute a function with read access to the counter
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&CounterState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    pub fn value(&self) -> i64 {
        self.read(CounterState::value)
    }

    pub fn is_locked(&self) -> bool {
        self.read(CounterState::is_locked)
    }

    /// Subscribe to change events
    ///
    /// Returns a receiver that will get notified of all future value changes.
    pub fn subscribe(&self) -> broadcast::Receiver<CounterChange> {
        self.change_tx.subscribe()
    }

    /// Increment by `step`. Returns `true` if the value changed.
    pub fn increment(&self, step: i64) -> bool {
        self.mutate(|state| state.increment(step))
    }

    /// Decrement by `step`. Returns `true` if the value changed.
    pub fn decrement(&self, step: i64) -> bool {
        self.mutate(|state| state.decrement(step))
    }

    pub fn lock(&self) {
        self.write(CounterState::lock);
        tracing::debug!("Counter locked");
    }

    pub fn unlock(&self) {
        self.write(CounterState::unlock);
        tracing::debug!("Counter unlocked");
    }

    fn write<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut CounterState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut CounterState) -> bool,
    {
        let (changed, value) = self.write(|state| (f(state), state.value()));

        if changed {
            tracing::trace!("Counter value changed to {}", value);
            // Ignore send errors - it's OK if no one is listening
            let _ = self.change_tx.send(CounterChange::ValueChanged { value });
        }

        changed
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new(CounterState::default())
    }
}

impl Clone for CounterStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            change_tx: self.change_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundPolicy, Bounds};

    #[test]
    fn test_new_store() {
        let store = CounterStore::default();
        assert_eq!(store.value(), 0);
        assert!(!store.is_locked());
    }

    #[test]
    fn test_increment_emits_event() {
        let store = CounterStore::default();
        let mut rx = store.subscribe();

        assert!(store.increment(1));

        assert_eq!(rx.try_recv().unwrap(), CounterChange::ValueChanged { value: 1 });
    }

    #[test]
    fn test_noop_emits_nothing() {
        let store = CounterStore::default();
        let mut rx = store.subscribe();

        // Already at MIN
        assert!(!store.decrement(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_lock_emits_nothing_and_freezes() {
        let store = CounterStore::default();
        let mut rx = store.subscribe();

        store.lock();
        assert!(store.is_locked());
        store.increment(1);
        store.decrement(1);

        assert_eq!(store.value(), 0);
        assert!(rx.try_recv().is_err());

        store.unlock();
        store.increment(1);
        assert_eq!(store.value(), 1);
        assert_eq!(rx.try_recv().unwrap(), CounterChange::ValueChanged { value: 1 });
    }

    #[test]
    fn test_clone_shares_state() {
        let store1 = CounterStore::default();
        let store2 = store1.clone();
        let mut rx = store2.subscribe();

        store1.increment(3);

        assert_eq!(store2.value(), 3);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_snapshot_keeps_policy() {
        let state = CounterState::new(Bounds::default(), 9)
            .unwrap()
            .with_policy(BoundPolicy::Clamp);
        let store = CounterStore::new(state);

        store.increment(5);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.value(), 10);
        assert_eq!(snapshot.policy(), BoundPolicy::Clamp);
    }
}
