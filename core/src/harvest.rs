//! Per-device polling state machine with adaptive backoff and batching.

use crate::blackboard::Blackboard;
use crate::device::DeviceSession;
use crate::task::{FollowUp, Task};
use crate::transport::HarvestTransport;
use async_trait::async_trait;
use shared::api::DeviceKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Adaptive backoff applied to a harvest task's own re-poll interval.
///
/// Doubles (capped at `max_ms`) on failure; decays toward `min_ms` by a
/// factor of 0.9 on success. The decayed value is truncated to an integer
/// millisecond count at the point of computation so `current_ms` never
/// drifts into a fractional representation.
#[derive(Debug, Clone, Copy)]
pub struct BackoffState {
    current_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

impl BackoffState {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            current_ms: min_ms,
            min_ms,
            max_ms,
        }
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    pub fn at_max(&self) -> bool {
        self.current_ms >= self.max_ms
    }

    pub fn on_failure(&mut self) {
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
    }

    pub fn on_success(&mut self) {
        let decayed = (self.current_ms as f64 * 0.9) as u64;
        self.current_ms = decayed.max(self.min_ms);
    }
}

pub type RegisterMap = HashMap<String, i64>;

pub struct HarvestTask {
    due_time: u64,
    bb: Arc<Blackboard>,
    device_id: String,
    device_kind: DeviceKind,
    session: Arc<dyn DeviceSession>,
    barn: HashMap<u64, RegisterMap>,
    backoff: BackoffState,
    batch_size: usize,
    /// Set while a spawned transport has not yet received any reply for
    /// its current attempt; cleared the moment that attempt resolves
    /// (success, permanent failure, or give-up), even if the transport
    /// itself goes on to retry a later attempt under a fresh gate.
    transport_gate: Option<Arc<AtomicBool>>,
}

impl HarvestTask {
    pub fn new(
        due_time: u64,
        bb: Arc<Blackboard>,
        device_id: String,
        device_kind: DeviceKind,
        session: Arc<dyn DeviceSession>,
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
            barn: HashMap::new(),
            backoff: BackoffState::new(backoff_min_ms, backoff_max_ms),
            batch_size,
            transport_gate: None,
        }
    }

    #[cfg(test)]
    pub fn barn(&self) -> &HashMap<u64, RegisterMap> {
        &self.barn
    }

    #[cfg(test)]
    pub fn backoff_ms(&self) -> u64 {
        self.backoff.current_ms()
    }

    fn transport_busy(&self) -> bool {
        self.transport_gate
            .as_ref()
            .map(|gate| gate.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Task for HarvestTask {
    fn due_time(&self) -> u64 {
        self.due_time
    }

    fn kind(&self) -> &'static str {
        "harvest"
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    async fn execute(mut self: Box<Self>, now: u64) -> FollowUp {
        if self.session.is_terminated() {
            return FollowUp::None;
        }

        if !self.session.is_open() {
            if let Err(e) = self.session.open().await {
                tracing::warn!(device = %self.device_id, error = %e, "harvest: reopen failed");
                self.backoff.on_failure();
                self.due_time = now + self.backoff.current_ms();
                return FollowUp::One(self);
            }
        }

        match self.session.read_harvest_data().await {
            Err(e) => {
                tracing::warn!(device = %self.device_id, error = %e, "harvest: read failed");
                let was_at_max = self.backoff.at_max();
                self.backoff.on_failure();
                if was_at_max {
                    // The link has been down long enough that we've been
                    // retrying at the ceiling rate; drop the session so the
                    // next tick starts from a clean reconnect instead of
                    // reusing a socket that's likely wedged.
                    self.session.close().await;
                }
                self.due_time = now + self.backoff.current_ms();
                FollowUp::One(self)
            }
            Ok(registers) => {
                self.barn.insert(now, registers);
                self.backoff.on_success();

                if self.barn.len() >= self.batch_size && !self.transport_busy() {
                    let snapshot = std::mem::take(&mut self.barn);
                    let gate = Arc::new(AtomicBool::new(true));
                    self.transport_gate = Some(gate.clone());
                    let transport: Box<dyn Task> = Box::new(HarvestTransport::new(
                        now,
                        self.bb.clone(),
                        self.device_kind,
                        snapshot,
                        gate,
                    ));
                    self.due_time = now + self.backoff.current_ms();
                    FollowUp::Many(vec![self, transport])
                } else {
                    self.due_time = now + self.backoff.current_ms();
                    FollowUp::One(self)
                }
            }
        }
    }
}
