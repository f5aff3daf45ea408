// ── Debounced deferred task ──
//
// At most one pending timer. Arming again aborts the pending timer and
// starts a new one; firing clears the armed slot before running the
// callback. A generation counter stops a timer that was already past its
// sleep when it got superseded.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct Debouncer {
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
}

impl Debouncer {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// (Re)start the timer; `fire` runs on a spawned task after the quiet
    /// period unless re-armed or cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn arm<F>(&self, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        if let Some(pending) = slot.handle.take() {
            pending.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;

        let delay = self.delay;
        let shared = Arc::clone(&self.slot);
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = lock(&shared);
                if slot.generation != generation {
                    return;
                }
                slot.handle = None;
            }
            fire();
        }));
    }

    /// Drop the pending timer, if any. Safe to call repeatedly.
    pub(crate) fn cancel(&self) {
        let mut slot = lock(&self.slot);
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(pending) = slot.handle.take() {
            pending.abort();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        lock(&self.slot).handle.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(slot: &Mutex<Slot>) -> std::sync::MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
