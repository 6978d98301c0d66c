//! Local subnet detection
//!
//! Finds a private /24 prefix to sweep by enumerating local interfaces.
//! Detection is bounded by a fixed timeout and treated as best-effort: any
//! failure or timeout means "no local subnet found" and the caller falls
//! back to the common private prefixes.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use tokio::time::timeout;
use tracing::debug;

/// Prefixes swept when no local subnet can be detected, in this exact order
pub const FALLBACK_PREFIXES: [&str; 3] = ["192.168.1", "192.168.0", "10.0.0"];

/// Detect the local private /24 prefix, bounded by `bound`
///
/// Returns `None` on timeout or when no non-loopback private IPv4 address
/// exists; never an error.
pub async fn detect_local_prefix(bound: Duration) -> Option<String> {
    match timeout(bound, tokio::task::spawn_blocking(interface_prefix)).await {
        Ok(Ok(found)) => found,
        Ok(Err(_)) | Err(_) => {
            debug!("Local subnet detection timed out or failed");
            None
        }
    }
}

fn interface_prefix() -> Option<String> {
    let interfaces = NetworkInterface::show().ok()?;
    for iface in interfaces {
        for addr in &iface.addr {
            if let IpAddr::V4(v4) = addr.ip() {
                if !v4.is_loopback() && v4.is_private() {
                    debug!(interface = %iface.name, ip = %v4, "Using local address for subnet");
                    return Some(prefix_of(v4));
                }
            }
        }
    }
    None
}

/// The /24 prefix of an address, as `"a.b.c"`
fn prefix_of(ip: Ipv4Addr) -> String {
    let octets = ip.octets();
    format!("{}.{}.{}", octets[0], octets[1], octets[2])
}
