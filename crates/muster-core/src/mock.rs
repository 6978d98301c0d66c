//! In-memory transport used by the engine's tests
//!
//! Scriptable: addresses can be declared as listeners, property fetches and
//! execs can be made to fail per serial, and every connect attempt and exec
//! is recorded for assertions.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::device::{ConnectionState, Serial};
use crate::transport::{DeviceHandle, Transport, TransportError, TransportEvent};

#[derive(Default)]
struct MockInner {
    /// Addresses that accept a connect, with the state they come up in
    listeners: HashMap<String, ConnectionState>,
    /// Live device list as the bridge would report it
    devices: BTreeMap<Serial, DeviceHandle>,
    properties: HashMap<Serial, BTreeMap<String, String>>,
    failing_properties: HashSet<Serial>,
    exec_failures: HashMap<Serial, String>,
    exec_outputs: HashMap<Serial, String>,
    connect_attempts: Vec<String>,
    exec_log: Vec<(Serial, String)>,
}

pub struct MockTransport {
    inner: Mutex<MockInner>,
    events: broadcast::Sender<TransportEvent>,
    port: u16,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(MockInner::default()),
            events,
            port: 5555,
        }
    }

    /// Declare an address that will accept a connect
    pub fn add_listener(&self, address: &str, state: ConnectionState) {
        self.inner
            .lock()
            .unwrap()
            .listeners
            .insert(address.to_string(), state);
    }

    /// Put a handle straight into the live list
    pub fn insert_device(&self, handle: DeviceHandle) {
        self.inner
            .lock()
            .unwrap()
            .devices
            .insert(handle.serial.clone(), handle);
    }

    pub fn set_properties(&self, serial: &Serial, props: BTreeMap<String, String>) {
        self.inner
            .lock()
            .unwrap()
            .properties
            .insert(serial.clone(), props);
    }

    pub fn fail_properties(&self, serial: &Serial) {
        self.inner
            .lock()
            .unwrap()
            .failing_properties
            .insert(serial.clone());
    }

    pub fn fail_exec(&self, serial: &Serial, reason: &str) {
        self.inner
            .lock()
            .unwrap()
            .exec_failures
            .insert(serial.clone(), reason.to_string());
    }

    pub fn set_exec_output(&self, serial: &Serial, output: &str) {
        self.inner
            .lock()
            .unwrap()
            .exec_outputs
            .insert(serial.clone(), output.to_string());
    }

    pub fn connect_attempts(&self) -> Vec<String> {
        self.inner.lock().unwrap().connect_attempts.clone()
    }

    pub fn exec_log(&self) -> Vec<(Serial, String)> {
        self.inner.lock().unwrap().exec_log.clone()
    }

    /// Raise a lifecycle event as the bridge would
    pub fn push_event(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<DeviceHandle, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_attempts.push(address.to_string());
        match inner.listeners.get(address).copied() {
            Some(state) => {
                let handle =
                    DeviceHandle::new(Serial::from_address(address, self.port), address, state);
                inner.devices.insert(handle.serial.clone(), handle.clone());
                Ok(handle)
            }
            None => Err(TransportError::Connect {
                address: address.to_string(),
                reason: "no listener".to_string(),
            }),
        }
    }

    async fn disconnect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        let serial = inner
            .devices
            .values()
            .find(|h| h.address == address)
            .map(|h| h.serial.clone());
        match serial {
            Some(serial) => {
                inner.devices.remove(&serial);
                Ok(())
            }
            None => Err(TransportError::Disconnect {
                address: address.to_string(),
                reason: "not connected".to_string(),
            }),
        }
    }

    async fn list(&self) -> Result<Vec<DeviceHandle>, TransportError> {
        Ok(self.inner.lock().unwrap().devices.values().cloned().collect())
    }

    async fn exec(&self, serial: &Serial, command: &str) -> Result<String, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.exec_failures.get(serial) {
            return Err(TransportError::Exec {
                serial: serial.to_string(),
                reason: reason.clone(),
            });
        }
        inner.exec_log.push((serial.clone(), command.to_string()));
        Ok(inner
            .exec_outputs
            .get(serial)
            .cloned()
            .unwrap_or_default())
    }

    async fn properties(&self, serial: &Serial) -> Result<BTreeMap<String, String>, TransportError> {
        let inner = self.inner.lock().unwrap();
        if inner.failing_properties.contains(serial) {
            return Err(TransportError::Properties {
                serial: serial.to_string(),
                reason: "unauthorized".to_string(),
            });
        }
        Ok(inner.properties.get(serial).cloned().unwrap_or_else(|| {
            let mut props = BTreeMap::new();
            props.insert("ro.product.model".to_string(), "mock-model".to_string());
            props
        }))
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
