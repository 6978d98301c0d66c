//! Muster Core - fleet device model, registry, and event bus
//!
//! This crate holds the shared pieces of the fleet session engine:
//! - Device types and the single-writer fleet registry
//! - The typed publish/subscribe event bus
//! - The `Transport` trait that concrete device bridges implement
//! - The observe/merge path that folds transport events into the registry

pub mod bus;
pub mod device;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod observe;
pub mod registry;
pub mod transport;

pub use bus::{EventBus, EventKind, FleetEvent, ScanProgress, SubscriptionId};
pub use device::{ConnectionState, Device, DeviceKind, FeatureFlags, Serial};
pub use error::FleetError;
pub use observe::absorb;
pub use registry::FleetRegistry;
pub use transport::{DeviceHandle, Transport, TransportError, TransportEvent};
