//! The secure-element capability the core depends on.
//!
//! A concrete software-backed stub implementation lives in the gateway
//! binary crate; the real hardware element is out of scope here.

use async_trait::async_trait;

#[async_trait]
pub trait SecureElement: Send + Sync {
    /// The device's stable serial number, used as part of the signed
    /// request identity.
    async fn serial_number(&self) -> anyhow::Result<String>;

    /// Signs `payload` and returns a compact signed token (a JWT in the
    /// reference implementation) suitable for inclusion in an upload or
    /// settings request.
    async fn sign(&self, payload: &serde_json::Value) -> anyhow::Result<String>;
}
