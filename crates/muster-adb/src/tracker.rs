//! Poll-based device tracker
//!
//! adb has no push notification the CLI can consume, so the tracker polls
//! the live list on a fixed interval and diffs it against the previous poll
//! to synthesize add/remove/change events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use muster_core::{ConnectionState, DeviceHandle, Serial, Transport, TransportEvent};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::transport::AdbTransport;

/// Diff a poll result against the previously seen states
pub fn diff_device_lists(
    known: &HashMap<Serial, ConnectionState>,
    current: &[DeviceHandle],
) -> Vec<TransportEvent> {
    let mut events = Vec::new();

    for handle in current {
        match known.get(&handle.serial) {
            None => events.push(TransportEvent::Added(handle.clone())),
            Some(prev) if *prev != handle.state => {
                events.push(TransportEvent::Changed(handle.clone()))
            }
            Some(_) => {}
        }
    }

    for serial in known.keys() {
        if !current.iter().any(|h| &h.serial == serial) {
            events.push(TransportEvent::Removed(serial.clone()));
        }
    }

    events
}

/// Spawn the tracker loop; runs until the returned handle is aborted
pub fn spawn_tracker(transport: Arc<AdbTransport>, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut known: HashMap<Serial, ConnectionState> = HashMap::new();
        let mut ticker = interval(poll_interval);
        info!(interval_ms = poll_interval.as_millis() as u64, "Device tracker started");

        loop {
            ticker.tick().await;

            let handles = match transport.list().await {
                Ok(handles) => handles,
                Err(e) => {
                    debug!(error = %e, "Device list poll failed");
                    continue;
                }
            };

            for event in diff_device_lists(&known, &handles) {
                transport.send_event(event);
            }

            known = handles
                .into_iter()
                .map(|h| (h.serial, h.state))
                .collect();
        }
    })
}
