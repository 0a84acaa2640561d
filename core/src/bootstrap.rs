//! Parsing and formatting for the declarative bootstrap file.
//!
//! The bootstrap file lets an installer pre-provision a device without
//! going through the local HTTP surface: one line per device, appended to
//! as devices are added or removed, so the gateway can recover its last
//! known device across a restart without a database. Concrete file I/O and
//! the listener that keeps the file in sync with the blackboard live in the
//! binary crate; this module only knows the line grammar.

use shared::api::DeviceKind;

/// One device entry read from (or written to) the bootstrap file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapEntry {
    pub kind: DeviceKind,
    pub address: String,
    pub port: u16,
    pub unit_id: u8,
}

/// Parses a bootstrap file's contents.
///
/// Grammar, one entry per line: `device <tcp|rtu> <address> <port> <unit_id>`.
/// Blank lines and lines starting with `#` are ignored. A malformed line is
/// skipped and logged rather than aborting the whole file, so one bad line
/// left over from a previous gateway version doesn't strand the device.
pub fn parse_bootstrap_file(contents: &str) -> Vec<BootstrapEntry> {
    let mut entries = Vec::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(entry) => entries.push(entry),
            None => tracing::warn!(line = lineno + 1, text = %line, "bootstrap: skipping malformed line"),
        }
    }
    entries
}

fn parse_line(line: &str) -> Option<BootstrapEntry> {
    let mut fields = line.split_whitespace();
    if fields.next()? != "device" {
        return None;
    }
    let kind = match fields.next()? {
        "tcp" => DeviceKind::Tcp,
        "rtu" => DeviceKind::Rtu,
        _ => return None,
    };
    let address = fields.next()?.to_string();
    let port: u16 = fields.next()?.parse().ok()?;
    let unit_id: u8 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(BootstrapEntry { kind, address, port, unit_id })
}

/// Formats a single device entry as a bootstrap file line, without a
/// trailing newline.
pub fn format_bootstrap_line(kind: DeviceKind, address: &str, port: u16, unit_id: u8) -> String {
    let kind = match kind {
        DeviceKind::Tcp => "tcp",
        DeviceKind::Rtu => "rtu",
    };
    format!("device {kind} {address} {port} {unit_id}")
}
