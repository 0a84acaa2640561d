//! Batched authenticated upload, built on the API-Call Base contract:
//! `PENDING -> IN_FLIGHT -> (OK | ERROR | FATAL)`.

use crate::blackboard::Blackboard;
use crate::harvest::RegisterMap;
use crate::http_client::HttpReply;
use crate::task::{FollowUp, Task};
use async_trait::async_trait;
use shared::api::{DeviceKind, MessageKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Retry backoff used between upload attempts when the backend is
/// unreachable at the network level (no reply at all, as distinct from a
/// reply that carries a non-200 status).
const NETWORK_ERROR_RETRY_MS: u64 = 2_000;

pub struct HarvestTransport {
    due_time: u64,
    bb: Arc<Blackboard>,
    device_kind: DeviceKind,
    barn: HashMap<u64, RegisterMap>,
    /// Cleared as soon as this attempt resolves to OK or a terminal ERROR,
    /// signalling the owning harvest task that it may spawn a new transport.
    gate: Arc<AtomicBool>,
}

impl HarvestTransport {
    pub fn new(
        due_time: u64,
        bb: Arc<Blackboard>,
        device_kind: DeviceKind,
        barn: HashMap<u64, RegisterMap>,
        gate: Arc<AtomicBool>,
    ) -> Self {
        Self {
            due_time,
            bb,
            device_kind,
            barn,
            gate,
        }
    }

    fn payload(&self) -> serde_json::Value {
        let barn: HashMap<String, &RegisterMap> = self
            .barn
            .iter()
            .map(|(ts, regs)| (ts.to_string(), regs))
            .collect();
        serde_json::json!({ "barn": barn, "type": self.device_kind })
    }

    /// Reads the backend's suggested retry delay out of an error reply;
    /// `0` (including an absent field) means give up and drop the batch.
    fn on_error(reply: &HttpReply) -> u64 {
        reply
            .body
            .get("retry_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    fn release_gate(&self) {
        self.gate.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Task for HarvestTransport {
    fn due_time(&self) -> u64 {
        self.due_time
    }

    fn kind(&self) -> &'static str {
        "harvest-transport"
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    async fn execute(mut self: Box<Self>, now: u64) -> FollowUp {
        let secure_element = self.bb.secure_element();
        let payload = self.payload();
        let signed = match secure_element.sign(&payload).await {
            Ok(jwt) => jwt,
            Err(e) => {
                tracing::warn!(error = %e, "transport: secure element unavailable, dropping batch");
                self.bb
                    .add_message(
                        MessageKind::Warning,
                        format!("secure element unavailable: {e}"),
                    )
                    .await;
                self.release_gate();
                return FollowUp::None;
            }
        };

        let url = self.bb.upload_url().to_string();
        let http = self.bb.http_client();
        match http
            .post_json(&url, serde_json::json!({ "jwt": signed }))
            .await
        {
            Ok(reply) if reply.status == 200 => {
                self.release_gate();
                FollowUp::None
            }
            Ok(reply) => {
                let retry_ms = Self::on_error(&reply);
                if retry_ms == 0 {
                    self.release_gate();
                    self.bb
                        .add_message(
                            MessageKind::Warning,
                            format!("upload rejected (status {}); batch dropped", reply.status),
                        )
                        .await;
                    FollowUp::None
                } else {
                    self.due_time = now + retry_ms;
                    FollowUp::One(self)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "transport: network error, will retry");
                // The gate stays set: from the harvest task's point of view
                // this attempt never resolved, so it must not spawn a
                // second concurrent upload for the same device.
                self.due_time = now + NETWORK_ERROR_RETRY_MS;
                FollowUp::One(self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpClient;
    use crate::secure_element::SecureElement;
    use std::sync::Mutex;

    struct NullSecureElement;
    #[async_trait]
    impl SecureElement for NullSecureElement {
        async fn serial_number(&self) -> anyhow::Result<String> {
            Ok("SN".into())
        }
        async fn sign(&self, _payload: &serde_json::Value) -> anyhow::Result<String> {
            Ok("token".into())
        }
    }

    struct FailingSecureElement;
    #[async_trait]
    impl SecureElement for FailingSecureElement {
        async fn serial_number(&self) -> anyhow::Result<String> {
            Ok("SN".into())
        }
        async fn sign(&self, _payload: &serde_json::Value) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("element locked"))
        }
    }

    struct ScriptedHttpClient {
        replies: Mutex<std::collections::VecDeque<anyhow::Result<HttpReply>>>,
    }
    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn post_json(
            &self,
            _url: &str,
            _body: serde_json::Value,
        ) -> anyhow::Result<HttpReply> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no more scripted replies")))
        }
    }

    fn test_blackboard(secure_element: Arc<dyn SecureElement>, http: Arc<dyn HttpClient>) -> Arc<Blackboard> {
        let (bb, _rx) = Blackboard::new(
            5000,
            "https://backend.example/upload".into(),
            "https://backend.example/settings".into(),
            secure_element,
            http,
            16,
        );
        Arc::new(bb)
    }

    fn sample_barn() -> HashMap<u64, RegisterMap> {
        let mut barn = HashMap::new();
        let mut regs = RegisterMap::new();
        regs.insert("1".into(), 1717);
        barn.insert(17, regs);
        barn
    }

    #[tokio::test]
    async fn test_successful_upload_releases_gate_and_terminates() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [Ok(HttpReply { status: 200, body: serde_json::json!({}) })]
                    .into_iter()
                    .collect(),
            ),
        });
        let bb = test_blackboard(Arc::new(NullSecureElement), http);
        let gate = Arc::new(AtomicBool::new(true));
        let transport = Box::new(HarvestTransport::new(
            0,
            bb,
            DeviceKind::Tcp,
            sample_barn(),
            gate.clone(),
        ));
        let followup = transport.execute(0).await;
        assert!(followup.is_none());
        assert!(!gate.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_error_with_zero_retry_drops_batch() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [Ok(HttpReply {
                    status: 500,
                    body: serde_json::json!({ "retry_ms": 0 }),
                })]
                .into_iter()
                .collect(),
            ),
        });
        let bb = test_blackboard(Arc::new(NullSecureElement), http);
        let gate = Arc::new(AtomicBool::new(true));
        let transport = Box::new(HarvestTransport::new(
            0,
            bb,
            DeviceKind::Tcp,
            sample_barn(),
            gate.clone(),
        ));
        let followup = transport.execute(0).await;
        assert!(followup.is_none());
        assert!(!gate.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_error_with_positive_retry_reschedules_and_keeps_gate() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [Ok(HttpReply {
                    status: 503,
                    body: serde_json::json!({ "retry_ms": 5000 }),
                })]
                .into_iter()
                .collect(),
            ),
        });
        let bb = test_blackboard(Arc::new(NullSecureElement), http);
        let gate = Arc::new(AtomicBool::new(true));
        let transport = Box::new(HarvestTransport::new(
            100,
            bb,
            DeviceKind::Tcp,
            sample_barn(),
            gate.clone(),
        ));
        let followup = transport.execute(100).await;
        match followup {
            FollowUp::One(next) => assert_eq!(next.due_time(), 5100),
            _ => panic!("expected retry reschedule"),
        }
        assert!(gate.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_secure_element_unavailable_drops_batch() {
        let http = Arc::new(ScriptedHttpClient { replies: Mutex::new(Default::default()) });
        let bb = test_blackboard(Arc::new(FailingSecureElement), http);
        let gate = Arc::new(AtomicBool::new(true));
        let transport = Box::new(HarvestTransport::new(
            0,
            bb,
            DeviceKind::Tcp,
            sample_barn(),
            gate.clone(),
        ));
        let followup = transport.execute(0).await;
        assert!(followup.is_none());
        assert!(!gate.load(Ordering::SeqCst));
    }
}
