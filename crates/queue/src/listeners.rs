use indexmap::IndexMap;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    callbacks: Mutex<IndexMap<u64, Callback<T>>>,
}

/// Callbacks notified in registration order.
///
/// Callbacks run outside the registry lock, so they may subscribe or
/// unsubscribe (themselves included) while being notified.
pub(crate) struct Listeners<T> {
    registry: Arc<Registry<T>>,
}

impl<T: 'static> Listeners<T> {
    pub(crate) fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                callbacks: Mutex::new(IndexMap::new()),
            }),
        }
    }

    pub(crate) fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.callbacks.lock().insert(id, Arc::new(callback));

        let registry: Weak<Registry<T>> = Arc::downgrade(&self.registry);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.callbacks.lock().shift_remove(&id);
                }
            })),
        }
    }

    pub(crate) fn notify(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = self
            .registry
            .callbacks
            .lock()
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();

        for (id, callback) in snapshot {
            // Skip anything unsubscribed by an earlier callback in this round.
            if !self.registry.callbacks.lock().contains_key(&id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
                warn!(listener = id, "Listener panicked");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.registry.callbacks.lock().len()
    }
}

/// Keeps a listener registered. Dropping it, or calling
/// [`Subscription::unsubscribe`], removes the listener.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Keep the listener registered for as long as its source lives.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
