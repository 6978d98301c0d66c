//! Parsers for adb CLI output

use muster_core::{ConnectionState, DeviceHandle, Serial};

/// Parse `adb devices -l` output into live handles
///
/// Expected shape:
/// ```text
/// List of devices attached
/// 192.168.1.5:5555       device product:husky model:Pixel_8 transport_id:1
/// emulator-5554          offline
/// 10.0.0.3:5555          unauthorized
/// ```
pub fn parse_devices_output(output: &str) -> Vec<DeviceHandle> {
    output
        .lines()
        .filter_map(parse_device_line)
        .collect()
}

fn parse_device_line(line: &str) -> Option<DeviceHandle> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("List of devices") || line.starts_with('*') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let serial = parts.next()?;
    let state = match parts.next()? {
        "device" => ConnectionState::Online,
        "offline" => ConnectionState::Offline,
        "unauthorized" => ConnectionState::Unauthorized,
        "connecting" | "authorizing" => ConnectionState::Connecting,
        _ => return None,
    };

    // Network serials are address:port; the address is everything before
    // the port separator. Emulator serials have no address of their own.
    let address = serial
        .rsplit_once(':')
        .map(|(addr, _)| addr)
        .unwrap_or(serial);

    Some(DeviceHandle::new(Serial::new(serial), address, state))
}

/// Parse `getprop` output (`[key]: [value]` per line) into a property map
pub fn parse_getprop_output(output: &str) -> std::collections::BTreeMap<String, String> {
    let mut props = std::collections::BTreeMap::new();
    for line in output.lines() {
        if let Some((key, value)) = split_getprop_line(line) {
            props.insert(key, value);
        }
    }
    props
}

fn split_getprop_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let rest = line.strip_prefix('[')?;
    let (key, rest) = rest.split_once("]: [")?;
    let value = rest.strip_suffix(']')?;
    Some((key.to_string(), value.to_string()))
}

/// Whether `adb connect` output indicates success
pub fn connect_succeeded(output: &str) -> bool {
    output.contains("connected to") || output.contains("already connected")
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_core::DeviceKind;

    #[test]
    fn test_parse_devices_output() {
        let output = "List of devices attached\n\
                      192.168.1.5:5555       device product:husky model:Pixel_8 transport_id:1\n\
                      emulator-5554          offline\n\
                      10.0.0.3:5555          unauthorized\n\n";
        let handles = parse_devices_output(output);
        assert_eq!(handles.len(), 3);

        assert_eq!(handles[0].serial.as_str(), "192.168.1.5:5555");
        assert_eq!(handles[0].address, "192.168.1.5");
        assert_eq!(handles[0].state, ConnectionState::Online);
        assert_eq!(handles[0].kind, DeviceKind::Physical);

        assert_eq!(handles[1].serial.as_str(), "emulator-5554");
        assert_eq!(handles[1].address, "emulator-5554");
        assert_eq!(handles[1].state, ConnectionState::Offline);
        assert_eq!(handles[1].kind, DeviceKind::Virtual);

        assert_eq!(handles[2].state, ConnectionState::Unauthorized);
    }

    #[test]
    fn test_parse_devices_skips_daemon_banner() {
        let output = "* daemon not running; starting now at tcp:5037\n\
                      * daemon started successfully\n\
                      List of devices attached\n\
                      192.168.0.2:5555 device\n";
        let handles = parse_devices_output(output);
        assert_eq!(handles.len(), 1);
    }

    #[test]
    fn test_parse_devices_empty_list() {
        assert!(parse_devices_output("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_parse_getprop_output() {
        let output = "[ro.product.model]: [Pixel 8]\n\
                      [ro.product.marketname]: [Pixel 8 Pro]\n\
                      not a property line\n\
                      [ro.build.version.sdk]: [34]\n";
        let props = parse_getprop_output(output);
        assert_eq!(props.len(), 3);
        assert_eq!(props.get("ro.product.model").unwrap(), "Pixel 8");
        assert_eq!(props.get("ro.build.version.sdk").unwrap(), "34");
    }

    #[test]
    fn test_connect_succeeded() {
        assert!(connect_succeeded("connected to 192.168.1.5:5555"));
        assert!(connect_succeeded("already connected to 192.168.1.5:5555"));
        assert!(!connect_succeeded(
            "failed to connect to '192.168.1.77:5555': Connection refused"
        ));
    }
}
