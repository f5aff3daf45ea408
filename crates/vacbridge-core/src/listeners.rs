// ── State-change listeners ──
//
// Insertion-ordered callback slots. Each callback runs in isolation: a
// panicking listener is logged and the rest still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::model::DeviceState;

type Listener = Arc<dyn Fn(&DeviceState) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ListenerSet {
    slots: Mutex<IndexMap<u64, Listener>>,
    next_id: AtomicU64,
}

impl ListenerSet {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add(self: &Arc<Self>, listener: Listener) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, listener);
        debug!(listener = id, "listener registered");
        ListenerHandle {
            id,
            set: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().shift_remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Invoke every listener once with `state`. Returns how many returned
    /// normally.
    pub(crate) fn notify_all(&self, state: &DeviceState) -> usize {
        // Clone out of the lock so listeners may add or remove listeners.
        let listeners: Vec<(u64, Listener)> = self
            .lock()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        let mut ok = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(state))) {
                Ok(()) => ok += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_owned())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "non-string panic payload".into());
                    error!(listener = id, panic = %message, "state listener panicked");
                }
            }
        }
        ok
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<u64, Listener>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration returned by `ConnectionSupervisor::add_listener`.
///
/// Dropping the handle keeps the listener registered; call
/// [`remove`](Self::remove) to unregister.
#[must_use = "keep the handle to be able to remove the listener"]
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    set: Weak<ListenerSet>,
}

impl ListenerHandle {
    /// Unregister the listener. Returns `false` if it was already gone.
    pub fn remove(self) -> bool {
        self.set.upgrade().is_some_and(|set| set.remove(self.id))
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter(hits: &Arc<AtomicUsize>) -> Listener {
        let hits = Arc::clone(hits);
        Arc::new(move |_: &DeviceState| {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn every_listener_runs_once() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _a = set.add(counter(&hits));
        let _b = set.add(counter(&hits));

        assert_eq!(set.notify_all(&DeviceState::default()), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    fn explode(_: &DeviceState) {
        panic!("listener bug");
    }

    #[test]
    fn panicking_listener_does_not_stop_the_others() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _bad = set.add(Arc::new(explode));
        let _good = set.add(counter(&hits));

        assert_eq!(set.notify_all(&DeviceState::default()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let handle = set.add(counter(&hits));

        assert!(handle.remove());
        assert_eq!(set.len(), 0);
        set.notify_all(&DeviceState::default());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_after_set_dropped_is_harmless() {
        let set = ListenerSet::new();
        let handle = set.add(Arc::new(|_: &DeviceState| {}));
        drop(set);
        assert!(!handle.remove());
    }
}
