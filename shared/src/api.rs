//! Wire types for the local HTTP control surface and the backend-origin
//! settings document.
//!
//! These are the request/response bodies exchanged between a browser or
//! installer tool and the gateway's local HTTP server, plus the structured
//! settings document the gateway pulls from and pushes to the backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `GET /api/uptime` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeResponse {
    pub msek: u64,
}

/// `GET /api/network/address` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAddressResponse {
    pub ip: String,
    pub port: u16,
}

/// One known Wi-Fi network, as returned by `GET /api/network/connections`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConnection {
    pub ssid: String,
    pub known: bool,
}

/// `GET /api/network/connections` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConnectionsResponse {
    pub connections: Vec<NetworkConnection>,
}

/// `GET /api/message` response (no `id` query parameter): the full list of message ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageIdsResponse {
    pub ids: Vec<u64>,
}

/// Severity of a logged message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Error,
    Warning,
    Info,
}

/// `GET /api/message?id=N` response: one message entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub message: String,
    pub timestamp: u64,
}

/// Modbus device kind, as carried in device-setup and harvest requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Tcp,
    Rtu,
}

/// `POST /api/device` request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSetupRequest {
    pub ip: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub address: u8,
}

/// Generic `{"status":"ok"}` / `{"status":"error","message":...}` envelope
/// used by the onboarding endpoints, matching the teacher's `ApiResponse`
/// success/error helper pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
        }
    }
}

/// One entry of the `commands` array accepted by `POST /api/modbus`.
///
/// Deserialized by hand (see [`ModbusCommand::from_value`]) rather than via
/// an untagged enum, so that a missing or unrecognized `type` field and a
/// missing required sub-field can each be reported with the distinct status
/// code the onboarding tooling expects (400 vs. 500), matching the wire
/// behavior this endpoint already has in the field.
#[derive(Debug, Clone, PartialEq)]
pub enum ModbusCommand {
    Write {
        starting_address: u16,
        values: Vec<u16>,
    },
    Pause {
        duration_ms: u64,
    },
}

impl ModbusCommand {
    /// Parses a single command object from its raw JSON value, dispatching
    /// on the `type` field before validating the remaining shape.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        let obj = value
            .as_object()
            .ok_or_else(|| "command must be a JSON object".to_string())?;
        let kind = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "command is missing required field 'type'".to_string())?;

        match kind {
            "write" => {
                let starting_address = obj
                    .get("startingAddress")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| "write command is missing 'startingAddress'".to_string())?
                    as u16;
                let values = obj
                    .get("values")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| "write command is missing 'values'".to_string())?
                    .iter()
                    .map(|v| v.as_u64().map(|n| n as u16))
                    .collect::<Option<Vec<u16>>>()
                    .ok_or_else(|| "write command 'values' must be an array of integers".to_string())?;
                Ok(ModbusCommand::Write {
                    starting_address,
                    values,
                })
            }
            "pause" => {
                let duration_ms = obj
                    .get("duration")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| "pause command is missing 'duration'".to_string())?;
                Ok(ModbusCommand::Pause { duration_ms })
            }
            other => Err(format!("unrecognized command type '{other}'")),
        }
    }
}

/// `POST /api/modbus` request body
#[derive(Debug, Clone, Deserialize)]
pub struct ModbusRequest {
    pub commands: Vec<serde_json::Value>,
}

/// `GET /health` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Provenance of the most recent mutation to a [`Settings`] document.
///
/// Notifications and push-backs to the backend only fire for local changes;
/// a pull applied from the backend is not pushed straight back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Local,
    Backend,
}

/// The backend-origin configuration document carried on the blackboard.
///
/// Free-form beyond a handful of well-known keys: the backend is free to add
/// fields the gateway does not interpret, and round-tripping them verbatim
/// is required so that a later push does not silently drop them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

impl Settings {
    /// Merges a freshly-pulled document into this one, tagging the result
    /// with its source. Backend updates replace matching keys wholesale;
    /// they never merge field-by-field into an existing nested object.
    pub fn update_from_value(&mut self, value: serde_json::Value) -> ChangeSource {
        if let serde_json::Value::Object(map) = value {
            for (k, v) in map {
                self.fields.insert(k, v);
            }
        }
        ChangeSource::Backend
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn set_local(&mut self, key: impl Into<String>, value: serde_json::Value) -> ChangeSource {
        self.fields.insert(key.into(), value);
        ChangeSource::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_helpers() {
        let ok = StatusResponse::ok();
        assert_eq!(ok.status, "ok");
        assert!(ok.message.is_none());

        let err = StatusResponse::error("bad device");
        assert_eq!(err.status, "error");
        assert_eq!(err.message.as_deref(), Some("bad device"));
    }

    #[test]
    fn test_modbus_command_write_parses() {
        let v = serde_json::json!({"type": "write", "startingAddress": 10, "values": [0, 1, 2]});
        let cmd = ModbusCommand::from_value(&v).unwrap();
        assert_eq!(
            cmd,
            ModbusCommand::Write {
                starting_address: 10,
                values: vec![0, 1, 2],
            }
        );
    }

    #[test]
    fn test_modbus_command_pause_parses() {
        let v = serde_json::json!({"type": "pause", "duration": 2000});
        let cmd = ModbusCommand::from_value(&v).unwrap();
        assert_eq!(cmd, ModbusCommand::Pause { duration_ms: 2000 });
    }

    #[test]
    fn test_modbus_command_missing_type_is_error() {
        let v = serde_json::json!({"startingAddress": 10, "values": [1]});
        assert!(ModbusCommand::from_value(&v).is_err());
    }

    #[test]
    fn test_modbus_command_unknown_type_is_error() {
        let v = serde_json::json!({"type": "reboot"});
        assert!(ModbusCommand::from_value(&v).is_err());
    }

    #[test]
    fn test_modbus_command_write_missing_fields() {
        let missing_address = serde_json::json!({"type": "write", "values": [1]});
        assert!(ModbusCommand::from_value(&missing_address).is_err());

        let missing_values = serde_json::json!({"type": "write", "startingAddress": 1});
        assert!(ModbusCommand::from_value(&missing_values).is_err());
    }

    #[test]
    fn test_modbus_command_pause_missing_duration() {
        let v = serde_json::json!({"type": "pause"});
        assert!(ModbusCommand::from_value(&v).is_err());
    }

    #[test]
    fn test_settings_update_tags_backend() {
        let mut settings = Settings::default();
        let source = settings.update_from_value(serde_json::json!({"upload_url": "https://x"}));
        assert_eq!(source, ChangeSource::Backend);
        assert_eq!(
            settings.get("upload_url").and_then(|v| v.as_str()),
            Some("https://x")
        );
    }

    #[test]
    fn test_settings_set_local_tags_local() {
        let mut settings = Settings::default();
        let source = settings.set_local("poll_interval_ms", serde_json::json!(5000));
        assert_eq!(source, ChangeSource::Local);
    }
}
