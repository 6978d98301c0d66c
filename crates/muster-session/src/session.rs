//! Fleet session: the one object consumers hold
//!
//! Constructed once and passed by reference; there is no implicit global.
//! All registry mutations flow through the session's paths: transport
//! lifecycle events via the event pump, scan finds via the scanner, and
//! command outcomes via the dispatcher.

use std::sync::Arc;

use muster_core::{
    absorb, Device, EventBus, EventKind, FleetError, FleetEvent, FleetRegistry, Serial,
    SubscriptionId, Transport, TransportEvent,
};
use muster_discovery::{ScanConfig, Scanner};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatcher::{DispatchOutcome, Dispatcher, Operation};

pub struct FleetSession<T: Transport> {
    transport: Arc<T>,
    registry: Arc<FleetRegistry>,
    bus: Arc<EventBus>,
    scanner: Arc<Scanner<T>>,
    dispatcher: Dispatcher<T>,
}

impl<T: Transport> FleetSession<T> {
    pub fn new(transport: Arc<T>) -> Arc<Self> {
        Self::with_scan_config(transport, ScanConfig::default())
    }

    pub fn with_scan_config(transport: Arc<T>, scan_config: ScanConfig) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(FleetRegistry::new(Arc::clone(&bus)));
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&transport),
            Arc::clone(&registry),
            scan_config,
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&transport), Arc::clone(&registry));
        Arc::new(Self {
            transport,
            registry,
            bus,
            scanner,
            dispatcher,
        })
    }

    pub fn registry(&self) -> &Arc<FleetRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Consume transport lifecycle events until the transport's event
    /// channel closes
    pub fn spawn_event_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        let mut events = session.transport.events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                session.apply_transport_event(event).await;
            }
            debug!("Transport event channel closed");
        })
    }

    /// Fold one transport event into the registry
    pub async fn apply_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Added(handle) | TransportEvent::Changed(handle) => {
                absorb(self.registry.as_ref(), self.transport.as_ref(), &handle).await;
            }
            TransportEvent::Removed(serial) => {
                self.registry.remove(&serial);
            }
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&FleetEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.registry.snapshot()
    }

    /// Connect to an address manually; failures surface both as the
    /// returned error and as an `Error` event
    pub async fn connect(&self, address: &str) -> Result<Device, FleetError> {
        match self.transport.connect(address).await {
            Ok(handle) => {
                info!(serial = %handle.serial, "Manual connect succeeded");
                absorb(self.registry.as_ref(), self.transport.as_ref(), &handle).await;
                Ok(self
                    .registry
                    .get(&handle.serial)
                    .unwrap_or_else(|| Device::new(handle.serial, handle.address, handle.state)))
            }
            Err(e) => {
                self.bus.publish(&FleetEvent::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub async fn disconnect_device(&self, serial: &Serial) -> Result<(), FleetError> {
        let device = self
            .registry
            .get(serial)
            .ok_or_else(|| FleetError::DeviceNotFound(serial.clone()))?;
        match self.transport.disconnect(&device.address).await {
            Ok(()) => {
                self.registry.remove(serial);
                info!(serial = %serial, "Disconnected");
                Ok(())
            }
            Err(e) => {
                self.bus.publish(&FleetEvent::Error(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Disconnect every known device; individual failures surface as
    /// `Error` events and do not stop the rest
    pub async fn disconnect_all(&self) {
        for device in self.snapshot() {
            let _ = self.disconnect_device(&device.serial).await;
        }
    }

    pub fn start_scan(&self) {
        self.scanner.start();
    }

    pub fn cancel_scan(&self) {
        self.scanner.cancel();
    }

    /// Run one full sweep inline; a no-op while one is already running
    pub async fn scan_once(&self) {
        self.scanner.scan_once().await;
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Dispatch an operation; an empty serial list means the whole fleet
    pub async fn dispatch(&self, operation: &Operation, serials: &[Serial]) -> DispatchOutcome {
        let targets = if serials.is_empty() {
            None
        } else {
            Some(serials)
        };
        self.dispatcher.run_on_fleet(operation, targets).await
    }

    /// Run one operation against one device, resolved via the live list
    pub async fn run_on_device(
        &self,
        serial: &Serial,
        operation: &Operation,
    ) -> Result<String, FleetError> {
        self.dispatcher.run_on_device(serial, operation).await
    }

    /// Fetch a device's properties and store them as its overlay text
    pub async fn get_properties(&self, serial: &Serial) -> Result<String, FleetError> {
        self.dispatcher
            .run_on_device(serial, &Operation::GetProperties)
            .await
    }

    /// Clear a device's overlay text; the timeout that drives this is
    /// owned by the caller
    pub fn clear_overlay(&self, serial: &Serial) -> bool {
        self.registry.patch(serial, |d| d.overlay_text = None)
    }
}
