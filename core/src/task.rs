//! The unit of scheduled work and its follow-up contract.

use async_trait::async_trait;

/// What a task's execution produces for the scheduler to enqueue next.
///
/// A task that wants to run again returns itself (possibly with mutated
/// internal state and a new due time) as `One`; a task that spawns
/// additional work alongside its own continuation returns `Many`; a task
/// that is finished returns `None` and is dropped.
pub enum FollowUp {
    None,
    One(Box<dyn Task>),
    Many(Vec<Box<dyn Task>>),
}

impl FollowUp {
    pub fn is_none(&self) -> bool {
        matches!(self, FollowUp::None)
    }
}

/// A unit of scheduled work.
///
/// `execute` consumes `self` so that a task can freely rebuild its own
/// state and hand itself back via [`FollowUp::One`]; the scheduler never
/// calls `execute` on two tasks concurrently, so implementations need not
/// be internally synchronized beyond what their own async I/O requires.
#[async_trait]
pub trait Task: Send + 'static {
    /// The time, in scheduler-clock milliseconds, at which this task wants
    /// to run. Read once, at enqueue time.
    fn due_time(&self) -> u64;

    /// A short, stable label used in log fields; never user-controlled.
    fn kind(&self) -> &'static str;

    async fn execute(self: Box<Self>, now: u64) -> FollowUp;

    /// Upcasts to `dyn Any` so tests can downcast a follow-up task back to
    /// its concrete type and inspect private state.
    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any>;
}
