//! The Wi-Fi network listing capability behind the onboarding
//! network-connections endpoint.
//!
//! No scan hardware is available in this environment; the concrete
//! implementation in the gateway binary crate is a stub.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub struct WifiNetwork {
    pub ssid: String,
    pub known: bool,
}

#[async_trait]
pub trait WifiScanner: Send + Sync {
    async fn scan(&self) -> anyhow::Result<Vec<WifiNetwork>>;
}
