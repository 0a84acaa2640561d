//! Executes a sequence of Modbus write/pause commands against the
//! currently registered device.

use crate::blackboard::Blackboard;
use crate::task::{FollowUp, Task};
use async_trait::async_trait;
use shared::api::ModbusCommand;
use std::collections::VecDeque;
use std::sync::Arc;

pub struct CommandWriteTask {
    due_time: u64,
    bb: Arc<Blackboard>,
    commands: VecDeque<ModbusCommand>,
}

impl CommandWriteTask {
    pub fn new(due_time: u64, bb: Arc<Blackboard>, commands: Vec<ModbusCommand>) -> Self {
        Self {
            due_time,
            bb,
            commands: commands.into(),
        }
    }
}

#[async_trait]
impl Task for CommandWriteTask {
    fn due_time(&self) -> u64 {
        self.due_time
    }

    fn kind(&self) -> &'static str {
        "command-write"
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }

    async fn execute(mut self: Box<Self>, now: u64) -> FollowUp {
        let Some((device_id, _kind, session)) = self.bb.current_device().await else {
            tracing::warn!("command-write: no device registered, dropping remaining commands");
            return FollowUp::None;
        };

        while let Some(command) = self.commands.pop_front() {
            match command {
                ModbusCommand::Write {
                    starting_address,
                    values,
                } => {
                    if let Err(e) = session.write(starting_address, &values).await {
                        tracing::warn!(
                            device = %device_id,
                            error = %e,
                            "command-write: write failed, aborting remaining commands"
                        );
                        return FollowUp::None;
                    }
                }
                ModbusCommand::Pause { duration_ms } => {
                    self.due_time = now + duration_ms;
                    return FollowUp::One(self);
                }
            }
        }
        FollowUp::None
    }
}
