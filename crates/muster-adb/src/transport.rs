//! adb CLI invocation wrapper

use std::collections::BTreeMap;
use std::time::Duration;

use muster_core::{DeviceHandle, Serial, Transport, TransportError, TransportEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::parse::{connect_succeeded, parse_devices_output, parse_getprop_output};

/// adb transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdbConfig {
    /// Path to the adb binary
    pub adb_path: String,
    /// TCP debug port devices listen on
    pub port: u16,
    /// Bound on a single connect attempt
    pub connect_timeout_ms: u64,
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            adb_path: "adb".to_string(),
            port: 5555,
            connect_timeout_ms: 5000,
        }
    }
}

/// Transport adapter driving the adb binary
pub struct AdbTransport {
    config: AdbConfig,
    events: broadcast::Sender<TransportEvent>,
}

impl AdbTransport {
    pub fn new(config: AdbConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { config, events }
    }

    pub fn config(&self) -> &AdbConfig {
        &self.config
    }

    pub(crate) fn send_event(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn endpoint(&self, address: &str) -> String {
        if address.contains(':') {
            address.to_string()
        } else {
            format!("{}:{}", address, self.config.port)
        }
    }

    /// Run adb with the given arguments, returning combined stdout
    async fn run(&self, args: &[&str]) -> Result<String, TransportError> {
        trace!(args = ?args, "Running adb");
        let output = tokio::process::Command::new(&self.config.adb_path)
            .args(args)
            .output()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            Err(TransportError::Unavailable(reason))
        }
    }
}

impl Transport for AdbTransport {
    async fn connect(&self, address: &str) -> Result<DeviceHandle, TransportError> {
        let endpoint = self.endpoint(address);
        let duration = Duration::from_millis(self.config.connect_timeout_ms);

        let output = match timeout(duration, self.run(&["connect", &endpoint])).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(TransportError::Connect {
                    address: endpoint,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(TransportError::Connect {
                    address: endpoint,
                    reason: "timed out".to_string(),
                })
            }
        };

        if !connect_succeeded(&output) {
            return Err(TransportError::Connect {
                address: endpoint,
                reason: output.trim().to_string(),
            });
        }

        // adb connect does not report the device state; read it back from
        // the live list so the handle carries what the bridge sees
        let serial = Serial::new(endpoint.clone());
        let handles = self.list().await?;
        match handles.into_iter().find(|h| h.serial == serial) {
            Some(handle) => {
                debug!(serial = %handle.serial, "Connected");
                Ok(handle)
            }
            None => Err(TransportError::Connect {
                address: endpoint,
                reason: "connected but absent from device list".to_string(),
            }),
        }
    }

    async fn disconnect(&self, address: &str) -> Result<(), TransportError> {
        let endpoint = self.endpoint(address);
        self.run(&["disconnect", &endpoint])
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Disconnect {
                address: endpoint,
                reason: e.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<DeviceHandle>, TransportError> {
        let output = self.run(&["devices", "-l"]).await?;
        Ok(parse_devices_output(&output))
    }

    async fn exec(&self, serial: &Serial, command: &str) -> Result<String, TransportError> {
        self.run(&["-s", serial.as_str(), "shell", command])
            .await
            .map_err(|e| TransportError::Exec {
                serial: serial.to_string(),
                reason: e.to_string(),
            })
    }

    async fn properties(&self, serial: &Serial) -> Result<BTreeMap<String, String>, TransportError> {
        let output = self
            .run(&["-s", serial.as_str(), "shell", "getprop"])
            .await
            .map_err(|e| TransportError::Properties {
                serial: serial.to_string(),
                reason: e.to_string(),
            })?;
        Ok(parse_getprop_output(&output))
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
