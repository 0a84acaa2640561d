//! A software-backed [`gwcore::SecureElement`] stub.
//!
//! Stands in for the physical secure element: an ephemeral HMAC key
//! generated at process start, used to sign outgoing requests as a compact
//! JWT. Not a hardware root of trust; good enough to exercise the signing
//! contract the harvest transport and settings tasks depend on.

use async_trait::async_trait;
use gwcore::secure_element::SecureElement;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;

#[derive(Serialize)]
struct Claims {
    #[serde(flatten)]
    payload: serde_json::Value,
    iat: u64,
    sub: String,
}

pub struct SoftwareSecureElement {
    serial: String,
    key: EncodingKey,
}

impl SoftwareSecureElement {
    pub fn new(serial: impl Into<String>, hmac_secret: &[u8]) -> Self {
        Self {
            serial: serial.into(),
            key: EncodingKey::from_secret(hmac_secret),
        }
    }
}

#[async_trait]
impl SecureElement for SoftwareSecureElement {
    async fn serial_number(&self) -> anyhow::Result<String> {
        Ok(self.serial.clone())
    }

    async fn sign(&self, payload: &serde_json::Value) -> anyhow::Result<String> {
        let claims = Claims {
            payload: payload.clone(),
            iat: shared::utils::current_timestamp_millis() / 1000,
            sub: self.serial.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.key)?;
        Ok(token)
    }
}
