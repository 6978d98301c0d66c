//! Command dispatcher
//!
//! Executes one operation against one device or fans it out across the
//! online subset of the fleet. Fleet dispatch uses settle-all joins: one
//! device's failure never aborts the others, and every targeted device has
//! its busy flag cleared exactly once regardless of outcome.

use std::sync::Arc;

use muster_core::{
    ConnectionState, Device, FleetError, FleetRegistry, Serial, Transport, TransportError,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Operation kinds the dispatcher knows how to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Reboot,
    /// Flip the device's layout-bounds overlay; the next state is the
    /// negation of the in-memory flag, persisted only on success
    ToggleLayoutBounds,
    ForceStop {
        app_id: String,
    },
    Uninstall {
        package: String,
    },
    /// Fetch the full property map and store it as the device's overlay
    /// text; clearing the overlay is the caller's job
    GetProperties,
}

impl Operation {
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Reboot => "reboot",
            Operation::ToggleLayoutBounds => "layout bounds toggle",
            Operation::ForceStop { .. } => "force-stop",
            Operation::Uninstall { .. } => "uninstall",
            Operation::GetProperties => "get properties",
        }
    }
}

/// Aggregated result of a fleet dispatch
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Display names of devices whose operation succeeded
    pub succeeded: Vec<String>,
    /// (display name, failure reason) for each failed device
    pub failed: Vec<(String, String)>,
}

impl DispatchOutcome {
    /// Consolidated human-readable summary; failures are never dropped
    pub fn summary(&self, operation: &Operation) -> String {
        if self.failed.is_empty() {
            return format!(
                "{} succeeded on {} device(s)",
                operation.label(),
                self.succeeded.len()
            );
        }
        let failures: Vec<String> = self
            .failed
            .iter()
            .map(|(name, reason)| format!("{}: {}", name, reason))
            .collect();
        format!(
            "{}: {} succeeded ({}), {} failed ({})",
            operation.label(),
            self.succeeded.len(),
            self.succeeded.join(", "),
            self.failed.len(),
            failures.join("; ")
        )
    }
}

pub struct Dispatcher<T: Transport> {
    transport: Arc<T>,
    registry: Arc<FleetRegistry>,
}

impl<T: Transport> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: Arc<T>, registry: Arc<FleetRegistry>) -> Self {
        Self { transport, registry }
    }

    /// Run one operation against one device, resolved through the
    /// transport's live list rather than the cached registry
    pub async fn run_on_device(
        &self,
        serial: &Serial,
        operation: &Operation,
    ) -> Result<String, FleetError> {
        let handles = self.transport.list().await?;
        let handle = handles
            .into_iter()
            .find(|h| &h.serial == serial)
            .ok_or_else(|| FleetError::DeviceNotFound(serial.clone()))?;
        if handle.state != ConnectionState::Online {
            return Err(FleetError::DeviceNotOnline(serial.clone()));
        }
        self.execute(serial, operation).await
    }

    /// Fan an operation out across the online subset of the fleet
    ///
    /// Devices in other states are silently excluded. When `targets` is
    /// given, the fan-out is restricted to those serials.
    pub async fn run_on_fleet(
        &self,
        operation: &Operation,
        targets: Option<&[Serial]>,
    ) -> DispatchOutcome {
        let targeted: Vec<Device> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|d| d.is_online())
            .filter(|d| targets.map_or(true, |t| t.contains(&d.serial)))
            .collect();
        let serials: Vec<Serial> = targeted.iter().map(|d| d.serial.clone()).collect();

        info!(
            operation = operation.label(),
            targets = serials.len(),
            "Dispatching fleet operation"
        );

        // One mutation marks every target busy
        self.registry.set_busy(&serials, true);

        let mut tasks = JoinSet::new();
        for device in targeted {
            let dispatcher = self.clone();
            let operation = operation.clone();
            tasks.spawn(async move {
                let result = dispatcher.execute(&device.serial, &operation).await;
                (device, result)
            });
        }

        let mut outcome = DispatchOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device, Ok(_))) => {
                    debug!(serial = %device.serial, "Operation succeeded");
                    outcome.succeeded.push(device.display_name);
                }
                Ok((device, Err(e))) => {
                    debug!(serial = %device.serial, error = %e, "Operation failed");
                    outcome.failed.push((device.display_name, e.to_string()));
                }
                Err(e) => {
                    // Busy still clears below for every targeted serial
                    warn!(error = %e, "Dispatch task panicked");
                }
            }
        }

        // Exactly once per target, regardless of individual outcomes
        self.registry.set_busy(&serials, false);

        outcome
    }

    pub(crate) async fn execute(
        &self,
        serial: &Serial,
        operation: &Operation,
    ) -> Result<String, FleetError> {
        match operation {
            Operation::Reboot => Ok(self.transport.exec(serial, "reboot").await?),
            Operation::ToggleLayoutBounds => {
                let next = !self
                    .registry
                    .get(serial)
                    .map(|d| d.feature_flags.layout_bounds_visible)
                    .unwrap_or(false);
                self.transport
                    .exec(serial, &format!("setprop debug.layout {}", next))
                    .await?;
                // Poke the system so running apps re-read the flag
                let output = self
                    .transport
                    .exec(serial, "service call activity 1599295570")
                    .await?;
                self.registry
                    .patch(serial, |d| d.feature_flags.layout_bounds_visible = next);
                Ok(output)
            }
            Operation::ForceStop { app_id } => Ok(self
                .transport
                .exec(serial, &format!("am force-stop {}", app_id))
                .await?),
            Operation::Uninstall { package } => {
                let output = self
                    .transport
                    .exec(serial, &format!("pm uninstall {}", package))
                    .await?;
                // pm reports some failures on a successful exit
                if output.contains("Failure") {
                    return Err(TransportError::Exec {
                        serial: serial.to_string(),
                        reason: output.trim().to_string(),
                    }
                    .into());
                }
                Ok(output)
            }
            Operation::GetProperties => {
                let props = self.transport.properties(serial).await?;
                let text = props
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.registry
                    .patch(serial, |d| d.overlay_text = Some(text.clone()));
                Ok(text)
            }
        }
    }
}
