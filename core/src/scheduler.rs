//! The single-threaded cooperative priority-time scheduler.
//!
//! There is exactly one loop: it pops the earliest-due task, sleeps to its
//! deadline if needed, runs it to completion, and enqueues whatever it
//! returns. No task is ever polled concurrently with another task's
//! `execute`; the only externally-driven input is the web-dispatch task's
//! own submission channel, drained the same way as everything else.

use crate::task::{FollowUp, Task};
use futures_util::FutureExt;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, info, warn};

struct Entry {
    due_time: u64,
    seq: u64,
    task: Box<dyn Task>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due_time == other.due_time && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so `BinaryHeap`, a max-heap, pops the earliest due_time
    // (and, on a tie, the earliest insertion sequence) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_time
            .cmp(&self.due_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Scheduler {
    queue: BinaryHeap<Entry>,
    next_seq: u64,
    clock: crate::clock::Clock,
    epsilon_ms: u64,
    past_due_clamp_ms: u64,
    shutdown: broadcast::Receiver<()>,
}

pub struct SchedulerConfig {
    pub epsilon_ms: u64,
    pub past_due_clamp_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            epsilon_ms: 10,
            past_due_clamp_ms: 100,
        }
    }
}

impl Scheduler {
    pub fn new(
        clock: crate::clock::Clock,
        initial_tasks: Vec<Box<dyn Task>>,
        config: SchedulerConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let mut scheduler = Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            clock,
            epsilon_ms: config.epsilon_ms,
            past_due_clamp_ms: config.past_due_clamp_ms,
            shutdown,
        };
        for task in initial_tasks {
            scheduler.enqueue(task);
        }
        scheduler
    }

    /// Enqueues a task, clamping its due time forward if it is already
    /// behind the clock. Used for both initial and follow-up tasks.
    pub fn enqueue(&mut self, task: Box<dyn Task>) {
        let now = self.clock.now_ms();
        let mut due = task.due_time();
        if due < now {
            info!(
                kind = task.kind(),
                original_due = due,
                now,
                "clamping past-due task"
            );
            due = now + self.past_due_clamp_ms;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry {
            due_time: due,
            seq,
            task,
        });
    }

    fn apply_followup(&mut self, followup: FollowUp) {
        match followup {
            FollowUp::None => {}
            FollowUp::One(task) => self.enqueue(task),
            FollowUp::Many(tasks) => {
                for task in tasks {
                    self.enqueue(task);
                }
            }
        }
    }

    async fn run_task(&mut self, task: Box<dyn Task>, now: u64) {
        let kind = task.kind();
        debug!(kind, now, "dequeued task");
        let outcome = AssertUnwindSafe(task.execute(now)).catch_unwind().await;
        match outcome {
            Ok(followup) => self.apply_followup(followup),
            Err(_) => {
                warn!(kind, "task panicked during execute; dropping it");
            }
        }
    }

    /// Runs until an interrupt is observed on the shutdown channel. Never
    /// returns early because of a task failure.
    pub async fn run(mut self) {
        loop {
            if self.shutdown.try_recv().is_ok() {
                info!("scheduler received shutdown signal");
                break;
            }

            let now = self.clock.now_ms();
            let next_due = match self.queue.peek() {
                Some(entry) => entry.due_time,
                None => {
                    // Idle: nothing queued. Block until shutdown; a fresh
                    // task can only arrive via a follow-up from a running
                    // task, and nothing is running, so this only happens
                    // if every task has terminated itself.
                    let _ = self.shutdown.recv().await;
                    info!("scheduler received shutdown signal while idle");
                    break;
                }
            };

            if next_due <= now + self.epsilon_ms {
                let entry = self.queue.pop().expect("peeked entry must exist");
                self.run_task(entry.task, now).await;
                continue;
            }

            let sleep_until = TokioInstant::now() + Duration::from_millis(next_due - now);
            tokio::select! {
                biased;
                _ = self.shutdown.recv() => {
                    info!("scheduler received shutdown signal while sleeping");
                    break;
                }
                _ = tokio::time::sleep_until(sleep_until) => {}
            }
        }
    }
}
