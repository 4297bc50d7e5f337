//! In-process fan-out of accepted readings.
//!
//! [`ReadingBus`] holds a set of listeners and calls each of them
//! synchronously on every [`publish`](ReadingBus::publish). A listener that
//! panics is logged and skipped; the producer and the remaining listeners
//! are unaffected.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use tankfill_types::Reading;

/// A reading consumer.
///
/// Identity is the `Arc` allocation: subscribing the same `Listener` twice
/// keeps a single registration.
pub type Listener = Arc<dyn Fn(&Reading) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Reading) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Set-of-listeners fan-out. Cloning shares the same set.
#[derive(Clone, Default)]
pub struct ReadingBus {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl std::fmt::Debug for ReadingBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingBus")
            .field("listeners", &self.len())
            .finish()
    }
}

impl ReadingBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `false` if it was already registered.
    pub fn subscribe(&self, listener: &Listener) -> bool {
        let mut listeners = self.write();
        if listeners.iter().any(|l| Arc::ptr_eq(l, listener)) {
            return false;
        }
        listeners.push(Arc::clone(listener));
        true
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, listener: &Listener) -> bool {
        let mut listeners = self.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Invoke every current listener with `reading`.
    ///
    /// Listeners are called on a snapshot of the set, so a listener may
    /// subscribe or unsubscribe without deadlocking. Returns how many
    /// listeners completed without panicking.
    pub fn publish(&self, reading: &Reading) -> usize {
        let snapshot: Vec<Listener> = self.read().clone();
        let mut delivered = 0;
        for listener in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(reading))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    warn!(
                        "Reading listener panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        debug!(
            "Published reading at {} to {}/{} listeners",
            reading.timestamp,
            delivered,
            snapshot.len()
        );
        delivered
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Listener>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Listener>> {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
