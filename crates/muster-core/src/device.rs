//! Device types for tracking fleet endpoints

use serde::{Deserialize, Serialize};

/// Placeholder name when a property fetch fails on a reachable device
pub const UNKNOWN_DEVICE: &str = "Unknown Device";
/// Placeholder name when the device refused authorization
pub const UNAUTHORIZED_DEVICE: &str = "Unauthorized Device";

/// Stable unique identifier for a device, derived from its network address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Serial(pub String);

impl Serial {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// Build the canonical `address:port` serial for a network device
    pub fn from_address(address: &str, port: u16) -> Self {
        Self(format!("{}:{}", address, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection state reported by the device bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Device is connected and accepting commands
    Online,
    /// Device was seen but is not currently reachable
    Offline,
    /// Device is reachable but refused authorization
    Unauthorized,
}

/// Whether the endpoint is real hardware or an emulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Physical,
    Virtual,
}

/// Device-local toggles, kept only in memory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Layout bounds overlay currently visible on the device
    pub layout_bounds_visible: bool,
}

/// One known remote endpoint in the fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Unique identifier, typically `address:port`
    pub serial: Serial,
    /// Network address used for connect/disconnect/probing
    pub address: String,
    /// Current connection state
    pub state: ConnectionState,
    /// Physical hardware or emulator
    pub kind: DeviceKind,
    /// Human-readable name from the device's property set
    pub display_name: String,
    /// Model string from the device's property set
    pub model: String,
    /// Opaque handle to the device's current visual, owned by an
    /// external renderer; stored and forwarded only
    pub screen_ref: Option<String>,
    /// True while a dispatched operation is in flight
    pub busy: bool,
    /// Transient diagnostic text, cleared by the caller
    pub overlay_text: Option<String>,
    /// In-memory device-local toggles
    pub feature_flags: FeatureFlags,
}

impl Device {
    /// Create a new device with placeholder descriptive fields
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
            display_name: UNKNOWN_DEVICE.to_string(),
            model: String::new(),
            screen_ref: None,
            busy: false,
            overlay_text: None,
            feature_flags: FeatureFlags::default(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == ConnectionState::Online
    }
}
