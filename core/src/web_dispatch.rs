//! Drains the blackboard's submission channel each tick and hands the
//! drained tasks back to the scheduler alongside its own continuation.
//!
//! This is the one place HTTP-handler-originated work crosses from a
//! different tokio task into the scheduler's single-threaded world; every
//! other task only ever touches state the blackboard itself guards.

use crate::task::{FollowUp, Task};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub struct WebDispatchTask {
    due_time: u64,
    receiver: mpsc::Receiver<Box<dyn Task>>,
    batch_size: usize,
    interval_ms: u64,
}

impl WebDispatchTask {
    pub fn new(
        due_time: u64,
        receiver: mpsc::Receiver<Box<dyn Task>>,
        batch_size: usize,
        interval_ms: u64,
    ) -> Self {
        Self {
            due_time,
            receiver,
            batch_size,
            interval_ms,
        }
    }
}

#[async_trait]
impl Task for WebDispatchTask {
    fn due_time(&self) -> u64 {
        self.due_time
    }

    fn kind(&self) -> &'static str {
        "web-dispatch"
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    async fn execute(mut self: Box<Self>, now: u64) -> FollowUp {
        let mut drained: Vec<Box<dyn Task>> = Vec::new();
        for _ in 0..self.batch_size {
            match self.receiver.try_recv() {
                Ok(task) => drained.push(task),
                Err(_) => break,
            }
        }
        self.due_time = now + self.interval_ms;
        drained.push(self);
        FollowUp::Many(drained)
    }
}
