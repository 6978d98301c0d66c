//! Single-writer in-memory fleet registry
//!
//! The registry is the only mutation point for device state. Every
//! successful mutation publishes a `DevicesUpdate` event carrying the full
//! current snapshot, never a diff. Mutation and publish are synchronous and
//! non-suspending; callers serialize entry points.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::bus::{EventBus, FleetEvent};
use crate::device::{ConnectionState, Device, Serial};

pub struct FleetRegistry {
    devices: RwLock<BTreeMap<Serial, Device>>,
    bus: Arc<EventBus>,
}

impl FleetRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Insert or replace a device wholesale. A second upsert with the same
    /// serial updates in place.
    pub fn upsert(&self, device: Device) {
        let serial = device.serial.clone();
        {
            let mut devices = self.devices.write().expect("registry lock poisoned");
            devices.insert(serial.clone(), device);
        }
        debug!(serial = %serial, "Device upserted");
        self.publish_snapshot();
    }

    /// Apply a closure to a copy of the device and replace it wholesale.
    /// Returns false when the serial is unknown; no event fires in that case.
    pub fn patch<F>(&self, serial: &Serial, f: F) -> bool
    where
        F: FnOnce(&mut Device),
    {
        let patched = {
            let mut devices = self.devices.write().expect("registry lock poisoned");
            match devices.get(serial) {
                Some(current) => {
                    let mut next = current.clone();
                    f(&mut next);
                    devices.insert(serial.clone(), next);
                    true
                }
                None => false,
            }
        };
        if patched {
            self.publish_snapshot();
        }
        patched
    }

    /// State-only patch: descriptive fields stay untouched
    pub fn patch_state(&self, serial: &Serial, state: ConnectionState) -> bool {
        self.patch(serial, |device| device.state = state)
    }

    /// Flip the busy flag on a set of devices in a single mutation
    pub fn set_busy(&self, serials: &[Serial], busy: bool) {
        let changed = {
            let mut devices = self.devices.write().expect("registry lock poisoned");
            let mut changed = false;
            for serial in serials {
                if let Some(current) = devices.get(serial) {
                    let mut next = current.clone();
                    next.busy = busy;
                    devices.insert(serial.clone(), next);
                    changed = true;
                }
            }
            changed
        };
        if changed {
            self.publish_snapshot();
        }
    }

    /// Remove a device; returns false when the serial is unknown
    pub fn remove(&self, serial: &Serial) -> bool {
        let removed = {
            let mut devices = self.devices.write().expect("registry lock poisoned");
            devices.remove(serial).is_some()
        };
        if removed {
            debug!(serial = %serial, "Device removed");
            self.publish_snapshot();
        }
        removed
    }

    pub fn get(&self, serial: &Serial) -> Option<Device> {
        self.devices
            .read()
            .expect("registry lock poisoned")
            .get(serial)
            .cloned()
    }

    /// Whether any registered device uses this network address
    pub fn contains_address(&self, address: &str) -> bool {
        self.devices
            .read()
            .expect("registry lock poisoned")
            .values()
            .any(|device| device.address == address)
    }

    /// Full snapshot, ordered by serial
    pub fn snapshot(&self) -> Vec<Device> {
        self.devices
            .read()
            .expect("registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish_snapshot(&self) {
        self.bus.publish(&FleetEvent::DevicesUpdate(self.snapshot()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> FleetRegistry {
        FleetRegistry::new(Arc::new(EventBus::new()))
    }

    fn device(serial: &str, state: ConnectionState) -> Device {
        let serial = Serial::new(serial);
        let address = serial
            .as_str()
            .split(':')
            .next()
            .unwrap_or_default()
            .to_string();
        Device::new(serial, address, state)
    }

    #[test]
    fn test_upsert_same_serial_updates_in_place() {
        let reg = registry();
        reg.upsert(device("192.168.1.5:5555", ConnectionState::Connecting));
        reg.upsert(device("192.168.1.5:5555", ConnectionState::Online));

        assert_eq!(reg.len(), 1);
        let d = reg.get(&Serial::new("192.168.1.5:5555")).unwrap();
        assert_eq!(d.state, ConnectionState::Online);
    }

    #[test]
    fn test_snapshot_ordered_by_serial() {
        let reg = registry();
        reg.upsert(device("192.168.1.9:5555", ConnectionState::Online));
        reg.upsert(device("10.0.0.2:5555", ConnectionState::Online));
        reg.upsert(device("192.168.0.3:5555", ConnectionState::Offline));

        let serials: Vec<String> = reg
            .snapshot()
            .iter()
            .map(|d| d.serial.as_str().to_string())
            .collect();
        let mut sorted = serials.clone();
        sorted.sort();
        assert_eq!(serials, sorted);
    }

    #[test]
    fn test_state_patch_preserves_descriptive_fields() {
        let reg = registry();
        let serial = Serial::new("192.168.1.5:5555");
        let mut d = device("192.168.1.5:5555", ConnectionState::Online);
        d.display_name = "Pixel 8".to_string();
        d.model = "husky".to_string();
        d.screen_ref = Some("screen://pixel8".to_string());
        d.feature_flags.layout_bounds_visible = true;
        reg.upsert(d);

        assert!(reg.patch_state(&serial, ConnectionState::Offline));

        let patched = reg.get(&serial).unwrap();
        assert_eq!(patched.state, ConnectionState::Offline);
        assert_eq!(patched.display_name, "Pixel 8");
        assert_eq!(patched.model, "husky");
        assert_eq!(patched.screen_ref.as_deref(), Some("screen://pixel8"));
        assert!(patched.feature_flags.layout_bounds_visible);
    }

    #[test]
    fn test_every_mutation_publishes_full_snapshot() {
        let bus = Arc::new(EventBus::new());
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        bus.subscribe(EventKind::DevicesUpdate, move |event| {
            if let FleetEvent::DevicesUpdate(snapshot) = event {
                // Full state, not a diff
                assert!(snapshot.len() <= 2);
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let reg = FleetRegistry::new(bus);
        reg.upsert(device("a:5555", ConnectionState::Online));
        reg.upsert(device("b:5555", ConnectionState::Online));
        reg.remove(&Serial::new("a:5555"));
        assert_eq!(updates.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_patch_unknown_serial_is_silent() {
        let bus = Arc::new(EventBus::new());
        let updates = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&updates);
        bus.subscribe(EventKind::DevicesUpdate, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let reg = FleetRegistry::new(bus);
        assert!(!reg.patch_state(&Serial::new("missing:5555"), ConnectionState::Online));
        assert!(!reg.remove(&Serial::new("missing:5555")));
        assert_eq!(updates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_contains_address() {
        let reg = registry();
        reg.upsert(device("192.168.1.5:5555", ConnectionState::Online));
        assert!(reg.contains_address("192.168.1.5"));
        assert!(!reg.contains_address("192.168.1.6"));
    }
}
