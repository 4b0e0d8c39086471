//! Subscription handles for store change feeds.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Change callback. Receives a full snapshot of the subscribed collection.
pub type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

type Shared<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Registry<T> = Mutex<BTreeMap<u64, Shared<T>>>;

/// Guard for an active subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// A subscription that was never attached, e.g. because no map is open.
    pub fn inactive() -> Self {
        Self { cancel: None }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    /// Stop receiving updates.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
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

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Set of callbacks listening to one feed. Clones share the same set.
pub struct SubscriberSet<T> {
    next_id: Arc<AtomicU64>,
    callbacks: Arc<Registry<T>>,
}

impl<T> Clone for SubscriberSet<T> {
    fn clone(&self) -> Self {
        Self {
            next_id: Arc::clone(&self.next_id),
            callbacks: Arc::clone(&self.callbacks),
        }
    }
}

impl<T> Default for SubscriberSet<T> {
    fn default() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            callbacks: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl<T: 'static> SubscriberSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, first handing it `current` if given.
    pub fn subscribe(&self, callback: Callback<T>, current: Option<&T>) -> Subscription {
        let callback: Shared<T> = Arc::from(callback);
        if let Some(current) = current {
            callback(current);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.callbacks.lock() {
            Ok(mut callbacks) => {
                callbacks.insert(id, callback);
            }
            Err(e) => {
                log::warn!("Subscriber registry poisoned: {}", e);
                return Subscription::inactive();
            }
        }

        let registry: Weak<Registry<T>> = Arc::downgrade(&self.callbacks);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    if let Ok(mut callbacks) = registry.lock() {
                        callbacks.remove(&id);
                    }
                }
            })),
        }
    }

    /// Deliver a snapshot to every subscriber. Callbacks run without the
    /// registry lock held, so they may subscribe or unsubscribe.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<Shared<T>> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(e) => {
                log::warn!("Subscriber registry poisoned: {}", e);
                return;
            }
        };
        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Callback<u32>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, Box::new(move |_: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_notify_and_drop() {
        let set = SubscriberSet::<u32>::new();
        let (count, callback) = counter();
        let sub = set.subscribe(callback, None);
        set.notify(&1);
        set.notify(&2);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(sub);
        set.notify(&3);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(set.is_empty());
    }

    #[test]
    fn test_initial_delivery() {
        let set = SubscriberSet::<u32>::new();
        let (count, callback) = counter();
        let sub = set.subscribe(callback, Some(&7));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        sub.unsubscribe();
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_inactive_subscription() {
        let sub = Subscription::inactive();
        assert!(!sub.is_active());
        sub.unsubscribe();
    }

    #[test]
    fn test_subscription_outlives_set() {
        let set = SubscriberSet::<u32>::new();
        let (_, callback) = counter();
        let sub = set.subscribe(callback, None);
        drop(set);
        drop(sub);
    }
}
