//! File I/O for the declarative bootstrap file.
//!
//! [`gwcore::bootstrap`] only knows the line grammar; this module owns the
//! actual file handle and the registry listener that keeps it in sync with
//! the live device registry.

use gwcore::blackboard::{Blackboard, RegistryEvent};
use gwcore::bootstrap::format_bootstrap_line;
use shared::api::DeviceKind;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Reads the bootstrap file, returning an empty list if it does not exist
/// yet — a fresh install has nothing to recover.
pub fn load_bootstrap_entries(path: &str) -> Vec<gwcore::bootstrap::BootstrapEntry> {
    match std::fs::read_to_string(path) {
        Ok(contents) => gwcore::bootstrap::parse_bootstrap_file(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!(path, error = %e, "bootstrap: failed to read file, starting with no devices");
            Vec::new()
        }
    }
}

/// Encodes a device's connection details into the blackboard's opaque
/// device id, so the bootstrap listener can recover them from a
/// [`RegistryEvent`] without the blackboard needing to know about bootstrap
/// at all.
pub fn encode_device_id(kind: DeviceKind, address: &str, port: u16, unit_id: u8) -> String {
    let kind = match kind {
        DeviceKind::Tcp => "tcp",
        DeviceKind::Rtu => "rtu",
    };
    format!("{kind}|{address}|{port}|{unit_id}")
}

fn decode_device_id(id: &str) -> Option<(String, u16, u8)> {
    let mut fields = id.split('|');
    let _kind = fields.next()?;
    let address = fields.next()?.to_string();
    let port: u16 = fields.next()?.parse().ok()?;
    let unit_id: u8 = fields.next()?.parse().ok()?;
    Some((address, port, unit_id))
}

/// Registers a listener that appends a line to the bootstrap file every
/// time a device is added, so the file reflects current reality across a
/// restart. Removal is not un-appended; the file is a log of provisioning
/// history, replayed in order at startup, not a snapshot.
pub async fn register_bootstrap_listener(bb: &Blackboard, path: String) {
    let path = Arc::new(path);
    bb.register_listener(Arc::new(move |event: &RegistryEvent| {
        let RegistryEvent::Added { id, kind } = event else {
            return;
        };
        let Some((address, port, unit_id)) = decode_device_id(id) else {
            warn!(id, "bootstrap: device id not in the expected encoding, skipping append");
            return;
        };
        let line = format_bootstrap_line(*kind, &address, port, unit_id);
        if let Err(e) = append_line(&path, &line) {
            warn!(path = path.as_str(), error = %e, "bootstrap: failed to append device line");
        }
    }))
    .await;
}

fn append_line(path: &str, line: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let id = encode_device_id(DeviceKind::Tcp, "10.0.0.1", 502, 3);
        assert_eq!(decode_device_id(&id), Some(("10.0.0.1".to_string(), 502, 3)));
    }

    #[test]
    fn test_decode_rejects_malformed_id() {
        assert!(decode_device_id("not-an-encoded-id").is_none());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let entries = load_bootstrap_entries("/nonexistent/path/that/does/not/exist.txt");
        assert!(entries.is_empty());
    }
}
