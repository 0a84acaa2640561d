//! A no-hardware [`gwcore::WifiScanner`] stub.
//!
//! This deployment target has no Wi-Fi radio; the scan always succeeds and
//! returns an empty list so the onboarding endpoint stays well-behaved
//! rather than erroring out.

use async_trait::async_trait;
use gwcore::wifi_scanner::{WifiNetwork, WifiScanner};

pub struct NullWifiScanner;

#[async_trait]
impl WifiScanner for NullWifiScanner {
    async fn scan(&self) -> anyhow::Result<Vec<WifiNetwork>> {
        Ok(Vec::new())
    }
}
