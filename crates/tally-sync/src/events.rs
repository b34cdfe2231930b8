//! # Sync Event Bus
//!
//! Lets UI consumers (badges, banners, toasts) observe sync lifecycle
//! transitions without polling state.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SyncEventBus                                    │
//! │                                                                         │
//! │  subscribe(listener) ──► Subscription (unsubscribes on drop)           │
//! │                                                                         │
//! │  EVENT KINDS:                                                          │
//! │  • Started   { total }         - a drain pass began                    │
//! │  • Completed { item }          - one item synced and left the queue    │
//! │  • Failed    { item, error }   - one item failed and stays queued      │
//! │  • Retry     { item_id }       - a failed item was reset to pending    │
//! │                                                                         │
//! │  • Dispatch is synchronous, in registration order                      │
//! │  • No buffering/replay: subscribe after an event, miss that event      │
//! │  • Progress is NOT a bus event; it travels on a watch channel          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use tracing::trace;

use tally_core::SyncQueueItem;

// =============================================================================
// Sync Event
// =============================================================================

/// What happened during the sync lifecycle.
#[derive(Debug, Clone)]
pub enum SyncEventKind {
    /// A drain pass started over `total` snapshotted items.
    Started { total: usize },

    /// An item synced successfully and was removed from the queue.
    Completed { item: SyncQueueItem },

    /// An item's attempt failed; it stays queued for a later pass.
    Failed { item: SyncQueueItem, error: String },

    /// A previously failed item was reset to pending.
    Retry { item_id: String },
}

/// A sync lifecycle event with its emission time.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    fn now(kind: SyncEventKind) -> Self {
        SyncEvent {
            kind,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Multi-listener notification registry for sync lifecycle events.
#[derive(Default)]
pub struct SyncEventBus {
    /// Listeners in registration order.
    listeners: Mutex<Vec<(u64, Listener)>>,

    /// Monotonic subscription id source.
    next_id: AtomicU64,
}

impl SyncEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener invoked synchronously on every emitted event.
    ///
    /// The returned [`Subscription`] unsubscribes when dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .expect("event bus poisoned")
            .push((id, Arc::new(listener)));

        Subscription {
            id,
            bus: Arc::downgrade(self),
        }
    }

    /// Emits an event to every current listener, in registration order.
    ///
    /// Dispatch runs on a snapshot taken outside the registry lock, so a
    /// listener may subscribe or unsubscribe (including dropping its own
    /// [`Subscription`]) from inside its callback. Such changes take
    /// effect from the next emission.
    pub fn emit(&self, kind: SyncEventKind) {
        let event = SyncEvent::now(kind);
        trace!(?event, "Emitting sync event");

        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().expect("event bus poisoned");
            listeners.iter().map(|(_, listener)| listener.clone()).collect()
        };
        for listener in snapshot {
            listener(&event);
        }
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("event bus poisoned").len()
    }

    fn remove(&self, id: u64) {
        self.listeners
            .lock()
            .expect("event bus poisoned")
            .retain(|(listener_id, _)| *listener_id != id);
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle for one registered listener. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    bus: Weak<SyncEventBus>,
}

impl Subscription {
    /// Explicitly removes the listener (equivalent to dropping).
    pub fn unsubscribe(self) {
        // Drop impl does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::{OperationKind, Priority};

    fn item() -> SyncQueueItem {
        SyncQueueItem::new(OperationKind::Receipt, Some("r1".into()), json!({}), Priority::Normal)
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let bus = Arc::new(SyncEventBus::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let _s1 = bus.subscribe(move |_| o1.lock().unwrap().push("first"));
        let o2 = order.clone();
        let _s2 = bus.subscribe(move |_| o2.lock().unwrap().push("second"));

        bus.emit(SyncEventKind::Started { total: 1 });

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe_on_drop() {
        let bus = Arc::new(SyncEventBus::new());
        let count = Arc::new(Mutex::new(0));

        let c = count.clone();
        let sub = bus.subscribe(move |_| *c.lock().unwrap() += 1);
        assert_eq!(bus.listener_count(), 1);

        bus.emit(SyncEventKind::Started { total: 0 });
        drop(sub);
        assert_eq!(bus.listener_count(), 0);

        bus.emit(SyncEventKind::Started { total: 0 });
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let bus = Arc::new(SyncEventBus::new());
        bus.emit(SyncEventKind::Completed { item: item() });

        let seen = Arc::new(Mutex::new(0));
        let s = seen.clone();
        let _sub = bus.subscribe(move |_| *s.lock().unwrap() += 1);

        // The earlier event is gone; only new emissions arrive
        assert_eq!(*seen.lock().unwrap(), 0);
        bus.emit(SyncEventKind::Retry { item_id: "x".into() });
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_dispatch() {
        let bus = Arc::new(SyncEventBus::new());

        // A one-shot listener that drops another subscription from inside
        // its own callback; dispatch must not wedge on the registry lock
        let victim = Arc::new(Mutex::new(Some(bus.subscribe(|_| {}))));
        let slot = victim.clone();
        let _oneshot = bus.subscribe(move |_| {
            slot.lock().unwrap().take();
        });
        assert_eq!(bus.listener_count(), 2);

        bus.emit(SyncEventKind::Started { total: 0 });
        assert!(victim.lock().unwrap().is_none());
        assert_eq!(bus.listener_count(), 1);
    }

    #[test]
    fn test_listener_may_subscribe_during_dispatch() {
        let bus = Arc::new(SyncEventBus::new());
        let late_subs = Arc::new(Mutex::new(Vec::new()));

        let bus_handle = bus.clone();
        let sink = late_subs.clone();
        let _sub = bus.subscribe(move |_| {
            let sub = bus_handle.subscribe(|_| {});
            sink.lock().unwrap().push(sub);
        });

        // Newly added listeners take effect from the next emission
        bus.emit(SyncEventKind::Started { total: 0 });
        assert_eq!(late_subs.lock().unwrap().len(), 1);
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let bus = Arc::new(SyncEventBus::new());
        let sub = bus.subscribe(|_| {});
        assert_eq!(bus.listener_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.listener_count(), 0);
    }
}
