//! The outbound-HTTPS capability the core depends on for upload and
//! settings tasks.
//!
//! A concrete `reqwest`-backed implementation lives in the gateway binary
//! crate.

use async_trait::async_trait;

pub struct HttpReply {
    pub status: u16,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post_json(&self, url: &str, body: serde_json::Value) -> anyhow::Result<HttpReply>;
}
