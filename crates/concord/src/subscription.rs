//! Subscriber registries.
//!
//! Callbacks live behind an `Arc<Mutex<..>>` so a [`Subscription`] can
//! deregister without borrowing the document. Dispatch clones the callback
//! list out of the lock before calling, so a callback may unsubscribe
//! itself or others while an event is being delivered; a subscriber
//! removed mid-dispatch receives no further calls.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::warn;

struct Registry<K, F: ?Sized> {
    next_id: u64,
    entries: BTreeMap<u64, (K, Arc<F>)>,
}

pub(crate) struct SubscriberSet<K, F: ?Sized> {
    inner: Arc<Mutex<Registry<K, F>>>,
}

impl<K, F: ?Sized> Default for SubscriberSet<K, F> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: BTreeMap::new(),
            })),
        }
    }
}

fn lock<K, F: ?Sized>(m: &Mutex<Registry<K, F>>) -> MutexGuard<'_, Registry<K, F>> {
    // A poisoned lock only means a callback panicked while we held it; the
    // map itself is always left consistent.
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<K, F> SubscriberSet<K, F>
where
    K: Clone + Send + 'static,
    F: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn insert(&self, key: K, callback: Arc<F>) -> Subscription {
        let id = {
            let mut reg = lock(&self.inner);
            let id = reg.next_id;
            reg.next_id += 1;
            reg.entries.insert(id, (key, callback));
            id
        };
        let weak: Weak<Mutex<Registry<K, F>>> = Arc::downgrade(&self.inner);
        Subscription {
            remove: Mutex::new(Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).entries.remove(&id);
                }
            }))),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        lock(&self.inner).entries.is_empty()
    }

    /// Calls `call` for every subscriber whose key passes `filter`. A
    /// panicking callback is logged and does not stop delivery.
    pub(crate) fn emit(&self, filter: impl Fn(&K) -> bool, call: impl Fn(&K, &F)) {
        let snapshot: Vec<(u64, K, Arc<F>)> = lock(&self.inner)
            .entries
            .iter()
            .filter(|(_, (k, _))| filter(k))
            .map(|(id, (k, f))| (*id, k.clone(), f.clone()))
            .collect();
        for (id, key, callback) in snapshot {
            if !lock(&self.inner).entries.contains_key(&id) {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| call(&key, &callback)));
            if result.is_err() {
                warn!(subscriber = id, "subscriber callback panicked");
            }
        }
    }
}

/// Handle returned by every `subscribe*` call.
///
/// `unsubscribe` may be called any number of times, including from inside
/// a callback. Dropping the handle keeps the subscription alive for as
/// long as the document lives.
pub struct Subscription {
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let remove = self.remove.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(remove) = remove {
            remove();
        }
    }

    pub fn is_active(&self) -> bool {
        self.remove
            .lock()
            .map(|r| r.is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Cb = dyn Fn(u32) + Send + Sync;

    #[test]
    fn unsubscribe_is_idempotent() {
        let set: SubscriberSet<(), Cb> = SubscriberSet::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = set.insert((), Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        set.emit(|_| true, |_, f| f(1));
        sub.unsubscribe();
        sub.unsubscribe();
        set.emit(|_| true, |_, f| f(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(set.is_empty());
        assert!(!sub.is_active());
    }

    #[test]
    fn panicking_callback_does_not_stop_others() {
        let set: SubscriberSet<(), Cb> = SubscriberSet::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let _a = set.insert((), Arc::new(|_| panic!("boom")));
        let h = hits.clone();
        let _b = set.insert((), Arc::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        set.emit(|_| true, |_, f| f(0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(lock(&set.inner).entries.len(), 2);
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_safe() {
        let set: SubscriberSet<(), Cb> = SubscriberSet::default();
        let sub = set.insert((), Arc::new(|_| {}));
        drop(set);
        sub.unsubscribe();
    }
}
