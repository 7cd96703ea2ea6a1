// CounterStore: shared counter data model with synchronous observer fan-out
//
// One store instance is shared by every binding in the process. It is
// dependency-injected rather than a global singleton so tests (and hosts
// with more than one surface group) can own their own instance.

use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::trace;

use crate::error::StoreError;

/// Capacity of the broadcast side-channel for async update consumers.
///
/// Increments are user-driven (taps on a counter UI), so a small buffer is
/// plenty; lagged subscribers drop the oldest values.
const UPDATE_CHANNEL_CAPACITY: usize = 32;

/// Observer of counter changes
///
/// Observers are notified synchronously, in registration order, on the same
/// execution context that performed the mutation, with the post-mutation
/// value. The store's lock is held across mutation and notification, so an
/// observer must not call back into the store from `on_count_update`.
pub trait CounterObserver: Send + Sync {
    fn on_count_update(&self, new_count: i64);
}

/// Handle identifying one observer registration
///
/// Each `add_observer` call yields a fresh id, so a binding that registers
/// exactly once per attach can deregister exactly once per detach even when
/// several bindings share one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct StoreInner {
    counter: i64,
    next_observer_id: u64,
    observers: Vec<(ObserverId, Arc<dyn CounterObserver>)>,
}

/// Shared counter store
///
/// Holds the process-wide counter and its observer registry. Mutation and
/// notification are one atomic step: the internal lock is held across both,
/// so no observer can see a stale value and two concurrent increments cannot
/// interleave their notifications.
pub struct CounterStore {
    inner: Mutex<StoreInner>,
    updates: broadcast::Sender<i64>,
}

impl CounterStore {
    /// Create a store with the counter at zero and no observers.
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(StoreInner {
                counter: 0,
                next_observer_id: 0,
                observers: Vec::new(),
            }),
            updates,
        }
    }

    /// Safely acquire the store lock
    ///
    /// Returns MutexGuard or StoreError::LockPoisoned on lock failure
    fn lock_inner(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Read the current counter value.
    pub fn counter(&self) -> Result<i64, StoreError> {
        Ok(self.lock_inner()?.counter)
    }

    /// Increment the counter by one and notify every observer
    ///
    /// Overflow wraps two's-complement (`i64::wrapping_add`): after
    /// `i64::MAX` the counter is `i64::MIN`. There is no bounds checking.
    ///
    /// # Returns
    /// * `Ok(i64)` - The post-increment value
    /// * `Err(StoreError)` - Lock poisoning on the store
    pub fn increment(&self) -> Result<i64, StoreError> {
        let mut inner = self.lock_inner()?;
        let new_count = inner.counter.wrapping_add(1);
        inner.counter = new_count;
        trace!(new_count, "counter incremented");
        Self::notify(&inner, &self.updates, new_count);
        Ok(new_count)
    }

    /// Overwrite the counter and notify every observer
    ///
    /// Host-side reset path; not used by the channel protocol, which only
    /// ever increments.
    pub fn set_counter(&self, value: i64) -> Result<(), StoreError> {
        let mut inner = self.lock_inner()?;
        inner.counter = value;
        Self::notify(&inner, &self.updates, value);
        Ok(())
    }

    fn notify(inner: &StoreInner, updates: &broadcast::Sender<i64>, new_count: i64) {
        for (_, observer) in &inner.observers {
            observer.on_count_update(new_count);
        }
        // No async subscribers is the common case; ignore the send error.
        let _ = updates.send(new_count);
    }

    /// Register an observer for counter changes
    ///
    /// The observer only sees mutations performed after registration; the
    /// caller reads `counter()` separately for the initial value.
    ///
    /// # Returns
    /// * `Ok(ObserverId)` - Handle for the new registration
    /// * `Err(StoreError)` - Lock poisoning on the store
    pub fn add_observer(&self, observer: Arc<dyn CounterObserver>) -> Result<ObserverId, StoreError> {
        let mut inner = self.lock_inner()?;
        let id = ObserverId(inner.next_observer_id);
        inner.next_observer_id += 1;
        inner.observers.push((id, observer));
        Ok(id)
    }

    /// Deregister a previously registered observer
    ///
    /// # Returns
    /// * `Ok(())` - Observer removed; it will see no further notifications
    /// * `Err(StoreError::ObserverNotFound)` - Id was never registered or
    ///   was already removed
    pub fn remove_observer(&self, id: ObserverId) -> Result<(), StoreError> {
        let mut inner = self.lock_inner()?;
        let before = inner.observers.len();
        inner.observers.retain(|(observer_id, _)| *observer_id != id);
        if inner.observers.len() == before {
            return Err(StoreError::ObserverNotFound { id: id.0 });
        }
        Ok(())
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock_inner()?.observers.len())
    }

    /// Subscribe to post-mutation counter values on the broadcast
    /// side-channel. Independent of the synchronous observer registry.
    pub fn subscribe(&self) -> broadcast::Receiver<i64> {
        self.updates.subscribe()
    }

    /// Stream of post-mutation counter values for async consumers
    ///
    /// Lagged subscribers skip dropped values and continue.
    pub fn update_stream(&self) -> impl Stream<Item = i64> {
        BroadcastStream::new(self.subscribe()).filter_map(|value| value.ok())
    }
}

impl Default for CounterStore {
    fn default() -> Self {
        Self::new()
    }
}
