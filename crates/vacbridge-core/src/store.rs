// ── Device state store ──
//
// Single owned `DeviceState` behind a `watch` channel. The supervisor's
// inbound handler is the only writer; readers take cloned snapshots or
// subscribe for change notifications.

use tokio::sync::watch;
use vacbridge_api::InboundEvent;

use crate::model::DeviceState;

pub struct StateStore {
    state: watch::Sender<DeviceState>,
}

impl StateStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(DeviceState::default());
        Self { state }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> DeviceState {
        self.state.borrow().clone()
    }

    /// Receiver that wakes on every state-bearing frame.
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    /// Merge a decoded frame. Returns whether the frame carried state.
    pub(crate) fn apply(&self, event: &InboundEvent) -> bool {
        self.state.send_if_modified(|state| state.apply(event))
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn apply_wakes_subscribers_only_for_state_frames() {
        let store = StateStore::new();
        let mut rx = store.subscribe();

        let battery = InboundEvent::decode(br#"{"f":3,"p":64}"#).unwrap();
        assert!(store.apply(&battery));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().battery, Some(64));

        let system = InboundEvent::decode(br#"{"f":50,"p":{}}"#).unwrap();
        assert!(!store.apply(&system));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let store = StateStore::new();
        let before = store.snapshot();
        store.apply(&InboundEvent::decode(br#"{"f":4,"p":true}"#).unwrap());
        assert!(!before.charging);
        assert!(store.snapshot().charging);
    }
}
