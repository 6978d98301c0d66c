//! Transport adapter seam
//!
//! The concrete device bridge (the thing that speaks the debug protocol) is
//! an external collaborator. This trait pins its contract so the engine can
//! run against the real bridge or an in-memory mock.

use std::collections::BTreeMap;
use std::future::Future;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::device::{ConnectionState, DeviceKind, Serial};

/// Live handle to a device as the bridge currently sees it
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub serial: Serial,
    pub address: String,
    pub state: ConnectionState,
    pub kind: DeviceKind,
}

impl DeviceHandle {
    pub fn new(serial: Serial, address: impl Into<String>, state: ConnectionState) -> Self {
        let kind = if serial.as_str().starts_with("emulator-") {
            DeviceKind::Virtual
        } else {
            DeviceKind::Physical
        };
        Self {
            serial,
            address: address.into(),
            state,
            kind,
        }
    }
}

/// Lifecycle events raised by the bridge
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Added(DeviceHandle),
    Removed(Serial),
    Changed(DeviceHandle),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },
    #[error("disconnect from {address} failed: {reason}")]
    Disconnect { address: String, reason: String },
    #[error("exec on {serial} failed: {reason}")]
    Exec { serial: String, reason: String },
    #[error("property fetch on {serial} failed: {reason}")]
    Properties { serial: String, reason: String },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Contract of the device bridge
///
/// Methods return `impl Future + Send` so implementations stay spawnable
/// from concurrent task groups without boxing.
pub trait Transport: Send + Sync + 'static {
    /// Attempt a connection; success means the address hosts a listener
    fn connect(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<DeviceHandle, TransportError>> + Send;

    fn disconnect(&self, address: &str)
        -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Live device list as the bridge currently sees it
    fn list(&self) -> impl Future<Output = Result<Vec<DeviceHandle>, TransportError>> + Send;

    /// Run a shell command on one device, returning its raw output
    fn exec(
        &self,
        serial: &Serial,
        command: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Fetch the device's full property map
    fn properties(
        &self,
        serial: &Serial,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, TransportError>> + Send;

    /// Subscribe to add/remove/change lifecycle events
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}
