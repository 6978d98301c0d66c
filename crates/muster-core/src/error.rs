//! Error types shared across the engine

use thiserror::Error;

use crate::device::Serial;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("device {0} not found")]
    DeviceNotFound(Serial),
    #[error("device {0} is not online")]
    DeviceNotOnline(Serial),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
