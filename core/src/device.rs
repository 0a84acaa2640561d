//! The device-session capability the core depends on.
//!
//! A concrete Modbus TCP/RTU implementation lives in the gateway binary
//! crate; the core never constructs one, only holds it behind this trait.

use async_trait::async_trait;
use std::collections::HashMap;

/// One open (or openable) connection to an inverter.
///
/// `open`/`close` must be idempotent: calling either when already in the
/// target state is a no-op, not an error, since the harvest task and the
/// shutdown path may both invoke `close` on the same session.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    async fn open(&self) -> anyhow::Result<()>;
    async fn close(&self);
    fn is_open(&self) -> bool;

    /// True once the session has been permanently retired (e.g. superseded
    /// by a later Open-Device success). A terminated session never reopens.
    fn is_terminated(&self) -> bool;

    /// Permanently retires this session. A harvest task still holding this
    /// session must observe `is_terminated() == true` on its next tick and
    /// stop, rather than reopening a session that was superseded.
    fn terminate(&self);

    /// Reads the configured register map. Keys are register names/ids as
    /// strings so the harvest batch can be serialized without a fixed
    /// schema per inverter model.
    async fn read_harvest_data(&self) -> anyhow::Result<HashMap<String, i64>>;

    async fn write(&self, starting_address: u16, values: &[u16]) -> anyhow::Result<()>;

    /// Human-readable address, for logging and bootstrap round-tripping.
    fn address(&self) -> &str;
}
