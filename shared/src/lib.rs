//! Shared data structures and utilities for the energy gateway
//!
//! This crate contains the wire-level types and small helpers that both the
//! core scheduling crate and the gateway binary depend on: the HTTP DTOs for
//! the local control surface, the settings document exchanged with the
//! backend, default values for configuration fields, and checksum/validation
//! utilities.

pub mod api;
pub mod config;
pub mod defaults;
pub mod utils;

pub use api::{ChangeSource, DeviceKind, Settings};
pub use config::GatewayConfig;

/// Result type alias used throughout the shared crate
pub type Result<T> = anyhow::Result<T>;

/// Common error taxonomy shared between the core scheduler and the gateway binary
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("device returned a malformed reply: {0}")]
    DeviceMalformedReply(String),

    #[error("upload failed, retry scheduled: {0}")]
    UploadTransient(String),

    #[error("upload failed permanently: {0}")]
    UploadPermanent(String),

    #[error("secure element unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}
