//! Observation path: fold a transport handle into the registry
//!
//! The merge rule: a full property fetch runs only when the device is newly
//! observed or transitions from a non-online state into online. Every other
//! state change is a state-only patch that leaves descriptive fields alone.
//! This avoids redundant expensive fetches and visual flicker on benign
//! state echoes.

use tracing::{debug, warn};

use crate::device::{ConnectionState, Device, UNAUTHORIZED_DEVICE, UNKNOWN_DEVICE};
use crate::registry::FleetRegistry;
use crate::transport::{DeviceHandle, Transport};

/// Apply one observed handle to the registry
pub async fn absorb<T: Transport>(registry: &FleetRegistry, transport: &T, handle: &DeviceHandle) {
    let known = registry.get(&handle.serial);

    let needs_fetch = match &known {
        None => true,
        Some(prev) => {
            handle.state == ConnectionState::Online && prev.state != ConnectionState::Online
        }
    };

    if !needs_fetch {
        // Benign state echo or a non-online transition: state-only patch
        registry.patch_state(&handle.serial, handle.state);
        return;
    }

    let mut device = Device::new(handle.serial.clone(), handle.address.clone(), handle.state);
    device.kind = handle.kind;

    // A re-observed device keeps everything a property fetch does not supply
    if let Some(prev) = &known {
        device.screen_ref = prev.screen_ref.clone();
        device.overlay_text = prev.overlay_text.clone();
        device.feature_flags = prev.feature_flags;
        device.busy = prev.busy;
    }

    match transport.properties(&handle.serial).await {
        Ok(props) => {
            if let Some(model) = props.get("ro.product.model") {
                device.model = model.clone();
            }
            device.display_name = props
                .get("ro.product.marketname")
                .or_else(|| props.get("ro.product.model"))
                .cloned()
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());
            debug!(serial = %handle.serial, name = %device.display_name, "Fetched device properties");
        }
        Err(e) => {
            // Recovered locally: the device stays in the registry with a
            // placeholder name. Never surfaced as an error event.
            warn!(serial = %handle.serial, error = %e, "Property fetch failed, using placeholder");
            device.display_name = match handle.state {
                ConnectionState::Unauthorized => UNAUTHORIZED_DEVICE.to_string(),
                _ => UNKNOWN_DEVICE.to_string(),
            };
        }
    }

    registry.upsert(device);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::mock::MockTransport;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn registry() -> FleetRegistry {
        FleetRegistry::new(Arc::new(EventBus::new()))
    }

    fn handle(address: &str, state: ConnectionState) -> DeviceHandle {
        DeviceHandle::new(
            crate::device::Serial::from_address(address, 5555),
            address,
            state,
        )
    }

    #[tokio::test]
    async fn test_new_device_triggers_property_fetch() {
        let reg = registry();
        let transport = MockTransport::new();
        let h = handle("192.168.1.5", ConnectionState::Online);
        let mut props = BTreeMap::new();
        props.insert("ro.product.model".to_string(), "husky".to_string());
        props.insert("ro.product.marketname".to_string(), "Pixel 8 Pro".to_string());
        transport.set_properties(&h.serial, props);

        absorb(&reg, &transport, &h).await;

        let device = reg.get(&h.serial).unwrap();
        assert_eq!(device.display_name, "Pixel 8 Pro");
        assert_eq!(device.model, "husky");
        assert_eq!(device.state, ConnectionState::Online);
    }

    #[tokio::test]
    async fn test_repeated_online_is_state_only_patch() {
        let reg = registry();
        let transport = MockTransport::new();
        let h = handle("192.168.1.5", ConnectionState::Online);
        absorb(&reg, &transport, &h).await;

        // Give the device descriptive state the fetch would clobber
        reg.patch(&h.serial, |d| {
            d.display_name = "Renamed".to_string();
            d.screen_ref = Some("screen://live".to_string());
            d.feature_flags.layout_bounds_visible = true;
        });

        // Benign echo: already online, observed online again
        absorb(&reg, &transport, &h).await;

        let device = reg.get(&h.serial).unwrap();
        assert_eq!(device.display_name, "Renamed");
        assert_eq!(device.screen_ref.as_deref(), Some("screen://live"));
        assert!(device.feature_flags.layout_bounds_visible);
    }

    #[tokio::test]
    async fn test_online_to_offline_is_state_only_patch() {
        let reg = registry();
        let transport = MockTransport::new();
        absorb(&reg, &transport, &handle("10.0.0.7", ConnectionState::Online)).await;
        let serial = crate::device::Serial::from_address("10.0.0.7", 5555);
        reg.patch(&serial, |d| d.display_name = "Kept".to_string());

        absorb(&reg, &transport, &handle("10.0.0.7", ConnectionState::Offline)).await;

        let device = reg.get(&serial).unwrap();
        assert_eq!(device.state, ConnectionState::Offline);
        assert_eq!(device.display_name, "Kept");
    }

    #[tokio::test]
    async fn test_offline_to_online_refetches_but_keeps_unsupplied_fields() {
        let reg = registry();
        let transport = MockTransport::new();
        let serial = crate::device::Serial::from_address("10.0.0.7", 5555);
        absorb(&reg, &transport, &handle("10.0.0.7", ConnectionState::Online)).await;
        reg.patch(&serial, |d| {
            d.screen_ref = Some("screen://old".to_string());
            d.feature_flags.layout_bounds_visible = true;
        });
        absorb(&reg, &transport, &handle("10.0.0.7", ConnectionState::Offline)).await;

        let mut props = BTreeMap::new();
        props.insert("ro.product.model".to_string(), "fresh".to_string());
        transport.set_properties(&serial, props);

        absorb(&reg, &transport, &handle("10.0.0.7", ConnectionState::Online)).await;

        let device = reg.get(&serial).unwrap();
        // Supplied by the fetch
        assert_eq!(device.model, "fresh");
        // Not supplied by the fetch, so preserved
        assert_eq!(device.screen_ref.as_deref(), Some("screen://old"));
        assert!(device.feature_flags.layout_bounds_visible);
    }

    #[tokio::test]
    async fn test_failed_fetch_inserts_placeholder_never_drops_device() {
        let reg = registry();
        let transport = MockTransport::new();

        let h = handle("192.168.0.9", ConnectionState::Online);
        transport.fail_properties(&h.serial);
        absorb(&reg, &transport, &h).await;
        let device = reg.get(&h.serial).unwrap();
        assert_eq!(device.display_name, UNKNOWN_DEVICE);

        let h = handle("192.168.0.10", ConnectionState::Unauthorized);
        transport.fail_properties(&h.serial);
        absorb(&reg, &transport, &h).await;
        let device = reg.get(&h.serial).unwrap();
        assert_eq!(device.display_name, UNAUTHORIZED_DEVICE);
    }
}
