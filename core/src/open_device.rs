//! Establishes a device session, retiring any previously open one.

use crate::blackboard::Blackboard;
use crate::device::DeviceSession;
use crate::harvest::HarvestTask;
use crate::task::{FollowUp, Task};
use async_trait::async_trait;
use shared::api::DeviceKind;
use std::sync::Arc;

pub struct OpenDeviceTask {
    due_time: u64,
    bb: Arc<Blackboard>,
    device_id: String,
    device_kind: DeviceKind,
    session: Arc<dyn DeviceSession>,
    retry_delay_ms: u64,
    initial_harvest_delay_ms: u64,
    batch_size: usize,
    backoff_min_ms: u64,
    backoff_max_ms: u64,
}

impl OpenDeviceTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        due_time: u64,
        bb: Arc<Blackboard>,
        device_id: String,
        device_kind: DeviceKind,
        session: Arc<dyn DeviceSession>,
        retry_delay_ms: u64,
        initial_harvest_delay_ms: u64,
        batch_size: usize,
        backoff_min_ms: u64,
        backoff_max_ms: u64,
    ) -> Self {
        Self {
            due_time,
            bb,
            device_id,
            device_kind,
            session,
            retry_delay_ms,
            initial_harvest_delay_ms,
            batch_size,
            backoff_min_ms,
            backoff_max_ms,
        }
    }
}

#[async_trait]
impl Task for OpenDeviceTask {
    fn due_time(&self) -> u64 {
        self.due_time
    }

    fn kind(&self) -> &'static str {
        "open-device"
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    async fn execute(mut self: Box<Self>, now: u64) -> FollowUp {
        match self.session.open().await {
            Ok(()) => {
                let superseded = self.bb.remove_all_devices().await;
                for session in superseded {
                    session.terminate();
                    session.close().await;
                }
                self.bb
                    .add_device(self.device_id.clone(), self.device_kind, self.session.clone())
                    .await;
                tracing::info!(device = %self.device_id, "device opened");
                let harvest = Box::new(HarvestTask::new(
                    now + self.initial_harvest_delay_ms,
                    self.bb,
                    self.device_id,
                    self.device_kind,
                    self.session,
                    self.batch_size,
                    self.backoff_min_ms,
                    self.backoff_max_ms,
                ));
                FollowUp::One(harvest)
            }
            Err(e) => {
                tracing::warn!(device = %self.device_id, error = %e, "open-device: failed, retrying");
                self.due_time = now + self.retry_delay_ms;
                FollowUp::One(self)
            }
        }
    }
}
