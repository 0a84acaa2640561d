//! Periodic pull and on-demand push of the backend-origin settings
//! document.

use crate::blackboard::Blackboard;
use crate::task::{FollowUp, Task};
use async_trait::async_trait;
use shared::api::MessageKind;
use std::sync::Arc;

/// Fast one-off reattempt delay used when a pull fails, independent of the
/// regular pull cadence.
const PULL_ERROR_RETRY_MS: u64 = 30_000;

/// Pulls the settings document on a fixed cadence. The pull interval does
/// not depend on the previous attempt's outcome: a failed pull just logs
/// and the regularly scheduled tick still fires at `now + interval_ms`. A
/// failed pull additionally spawns a one-off retry at a short fixed delay,
/// so a transient backend outage doesn't have to wait out the full
/// interval before the next attempt.
pub struct PullSettingsTask {
    due_time: u64,
    bb: Arc<Blackboard>,
    interval_ms: u64,
    /// True for the spawned fast-retry instance: it does not itself spawn
    /// another retry or continue the regular cadence on failure.
    is_retry: bool,
}

impl PullSettingsTask {
    pub fn new(due_time: u64, bb: Arc<Blackboard>, interval_ms: u64) -> Self {
        Self {
            due_time,
            bb,
            interval_ms,
            is_retry: false,
        }
    }

    fn retry(due_time: u64, bb: Arc<Blackboard>, interval_ms: u64) -> Self {
        Self {
            due_time,
            bb,
            interval_ms,
            is_retry: true,
        }
    }

    async fn pull(&self) -> anyhow::Result<()> {
        let payload = serde_json::json!({});
        let signed = self.bb.secure_element().sign(&payload).await?;
        let reply = self
            .bb
            .http_client()
            .post_json(
                self.bb.settings_url(),
                serde_json::json!({ "jwt": signed }),
            )
            .await?;
        if reply.status == 200 {
            self.bb.update_settings_from_backend(reply.body).await;
            Ok(())
        } else {
            anyhow::bail!("settings endpoint returned status {}", reply.status)
        }
    }
}

#[async_trait]
impl Task for PullSettingsTask {
    fn due_time(&self) -> u64 {
        self.due_time
    }

    fn kind(&self) -> &'static str {
        "pull-settings"
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    async fn execute(mut self: Box<Self>, now: u64) -> FollowUp {
        if let Err(e) = self.pull().await {
            tracing::warn!(error = %e, "settings pull failed");
            self.bb
                .add_message(MessageKind::Warning, format!("settings pull failed: {e}"))
                .await;

            if self.is_retry {
                // The fast retry itself failed; the regular cadence (kept
                // running by the non-retry instance) will try again, no
                // need to chain further one-off retries.
                return FollowUp::None;
            }

            let retry = Box::new(PullSettingsTask::retry(
                now + PULL_ERROR_RETRY_MS,
                self.bb.clone(),
                self.interval_ms,
            ));
            self.due_time = now + self.interval_ms;
            return FollowUp::Many(vec![self, retry]);
        }

        if self.is_retry {
            // A successful fast retry has nothing further to do: it isn't
            // part of the regular cadence, which keeps running on its own.
            return FollowUp::None;
        }

        self.due_time = now + self.interval_ms;
        FollowUp::One(self)
    }
}

/// Pushes a locally-changed settings document to the backend, retrying a
/// bounded number of times before giving up.
pub struct PushSettingsTask {
    due_time: u64,
    bb: Arc<Blackboard>,
    document: serde_json::Value,
    retry_ms: u64,
    attempts_left: u8,
}

impl PushSettingsTask {
    pub fn new(
        due_time: u64,
        bb: Arc<Blackboard>,
        document: serde_json::Value,
        retry_ms: u64,
        max_attempts: u8,
    ) -> Self {
        Self {
            due_time,
            bb,
            document,
            retry_ms,
            attempts_left: max_attempts.saturating_sub(1),
        }
    }
}

#[async_trait]
impl Task for PushSettingsTask {
    fn due_time(&self) -> u64 {
        self.due_time
    }

    fn kind(&self) -> &'static str {
        "push-settings"
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    async fn execute(mut self: Box<Self>, now: u64) -> FollowUp {
        let signed = match self.bb.secure_element().sign(&self.document).await {
            Ok(jwt) => jwt,
            Err(e) => {
                tracing::warn!(error = %e, "push-settings: secure element unavailable");
                return FollowUp::None;
            }
        };
        let body = serde_json::json!({ "jwt": signed, "settings": self.document });
        let result = self.bb.http_client().post_json(self.bb.settings_url(), body).await;
        match result {
            Ok(reply) if reply.status == 200 => FollowUp::None,
            _ if self.attempts_left == 0 => {
                self.bb
                    .add_message(MessageKind::Warning, "settings push gave up after retries")
                    .await;
                FollowUp::None
            }
            _ => {
                self.attempts_left -= 1;
                self.due_time = now + self.retry_ms;
                FollowUp::One(self)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpClient, HttpReply};
    use crate::secure_element::SecureElement;
    use async_trait::async_trait;
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

    struct ScriptedHttpClient {
        replies: Mutex<std::collections::VecDeque<anyhow::Result<HttpReply>>>,
    }
    #[async_trait]
    impl HttpClient for ScriptedHttpClient {
        async fn post_json(&self, _url: &str, _body: serde_json::Value) -> anyhow::Result<HttpReply> {
            self.replies.lock().unwrap().pop_front().unwrap()
        }
    }

    fn test_blackboard(http: Arc<dyn HttpClient>) -> Arc<Blackboard> {
        let (bb, _rx) = Blackboard::new(
            5000,
            "https://backend.example/upload".into(),
            "https://backend.example/settings".into(),
            Arc::new(NullSecureElement),
            http,
            16,
        );
        Arc::new(bb)
    }

    #[tokio::test]
    async fn test_pull_settings_applies_backend_document_and_reschedules() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [Ok(HttpReply {
                    status: 200,
                    body: serde_json::json!({ "poll_interval_ms": 7000 }),
                })]
                .into_iter()
                .collect(),
            ),
        });
        let bb = test_blackboard(http);
        let task = Box::new(PullSettingsTask::new(0, bb.clone(), 60_000));
        let followup = task.execute(100).await;
        match followup {
            FollowUp::One(next) => assert_eq!(next.due_time(), 60_100),
            _ => panic!("expected reschedule regardless of outcome"),
        }
        let snapshot = bb.settings_snapshot().await;
        assert_eq!(
            snapshot.get("poll_interval_ms").and_then(|v| v.as_u64()),
            Some(7000)
        );
    }

    #[tokio::test]
    async fn test_pull_settings_reschedules_even_on_failure() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [Ok(HttpReply { status: 500, body: serde_json::json!({}) })]
                    .into_iter()
                    .collect(),
            ),
        });
        let bb = test_blackboard(http);
        let task = Box::new(PullSettingsTask::new(0, bb, 60_000));
        let followup = task.execute(100).await;
        match followup {
            FollowUp::Many(mut tasks) => {
                assert_eq!(tasks.len(), 2);
                tasks.sort_by_key(|t| t.due_time());
                assert_eq!(tasks[0].kind(), "pull-settings");
                assert_eq!(tasks[0].due_time(), 100 + PULL_ERROR_RETRY_MS);
                assert_eq!(tasks[1].kind(), "pull-settings");
                assert_eq!(tasks[1].due_time(), 60_100);
            }
            _ => panic!("expected both the regular reschedule and a fast retry"),
        }
    }

    #[tokio::test]
    async fn test_pull_settings_fast_retry_does_not_chain_further_retries() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [Ok(HttpReply { status: 500, body: serde_json::json!({}) })]
                    .into_iter()
                    .collect(),
            ),
        });
        let bb = test_blackboard(http);
        let retry = Box::new(PullSettingsTask::retry(100, bb, 60_000));
        let followup = retry.execute(100).await;
        assert!(followup.is_none());
    }

    #[tokio::test]
    async fn test_pull_settings_fast_retry_applies_document_on_success() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [Ok(HttpReply {
                    status: 200,
                    body: serde_json::json!({ "poll_interval_ms": 9000 }),
                })]
                .into_iter()
                .collect(),
            ),
        });
        let bb = test_blackboard(http);
        let retry = Box::new(PullSettingsTask::retry(100, bb.clone(), 60_000));
        let followup = retry.execute(100).await;
        assert!(followup.is_none());
        let snapshot = bb.settings_snapshot().await;
        assert_eq!(
            snapshot.get("poll_interval_ms").and_then(|v| v.as_u64()),
            Some(9000)
        );
    }

    #[tokio::test]
    async fn test_push_settings_gives_up_after_exhausting_retries() {
        let http = Arc::new(ScriptedHttpClient {
            replies: Mutex::new(
                [
                    Ok(HttpReply { status: 500, body: serde_json::json!({}) }),
                    Ok(HttpReply { status: 500, body: serde_json::json!({}) }),
                ]
                .into_iter()
                .collect(),
            ),
        });
        let bb = test_blackboard(http);
        let mut task = Box::new(PushSettingsTask::new(
            0,
            bb,
            serde_json::json!({"x": 1}),
            1000,
            2,
        ));
        let followup = task.execute(0).await;
        let next = match followup {
            FollowUp::One(t) => t,
            _ => panic!("expected one retry before giving up"),
        };
        task = next.into_any().downcast::<PushSettingsTask>().unwrap();
        let followup = task.execute(1000).await;
        assert!(followup.is_none());
    }
}
