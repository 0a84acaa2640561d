//! Utility functions shared between the core scheduler and the gateway binary
//!
//! Hashing, validation, and small data-manipulation helpers. Kept narrow on
//! purpose: anything that's only ever needed by one caller lives next to
//! that caller instead of here.

use base64::{engine::general_purpose::STANDARD as B64_STANDARD, Engine as _};
use blake3::Hasher;

/// Calculate BLAKE3 checksum of a string
///
/// Returns the hash as a hex-encoded string (64 characters). Used to compare
/// a locally held settings document against the backend's without
/// transmitting the whole document.
pub fn calculate_string_checksum(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Get current Unix timestamp in milliseconds, for wall-clock message
/// timestamps. Scheduling decisions must never use this; they use the
/// monotonic clock in `core::clock`.
pub fn current_timestamp_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Encode bytes to base64
pub fn encode_base64(content: &[u8]) -> String {
    B64_STANDARD.encode(content)
}

/// Decode a base64 string into bytes
pub fn decode_base64(encoded: &str) -> crate::Result<Vec<u8>> {
    B64_STANDARD
        .decode(encoded)
        .map_err(|e| crate::GatewayError::BadRequest(format!("invalid base64 sequence: {e}")).into())
}

/// Validate a device/session identifier: non-empty, bounded length,
/// restricted charset. Mirrors the shape of agent-id validation that kept
/// onboarding tooling from accepting pathological identifiers.
pub fn validate_identifier(id: &str, max_len: usize) -> crate::Result<()> {
    if id.is_empty() {
        return Err(crate::GatewayError::BadRequest("identifier cannot be empty".into()).into());
    }
    if id.len() > max_len {
        return Err(crate::GatewayError::BadRequest(format!(
            "identifier cannot be longer than {max_len} characters"
        ))
        .into());
    }
    if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.' || c == ':') {
        return Err(crate::GatewayError::BadRequest(
            "identifier contains characters outside the allowed set".into(),
        )
        .into());
    }
    Ok(())
}
