//! A `reqwest`-backed [`gwcore::HttpClient`] implementation.

use async_trait::async_trait;
use gwcore::http_client::{HttpClient, HttpReply};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(&self, url: &str, body: serde_json::Value) -> anyhow::Result<HttpReply> {
        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status().as_u16();
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok(HttpReply { status, body })
    }
}
