//! Hook for tasks a long-running wait did not expect.

use crate::tasks::{Task, TaskRef};

/// Decides what happens when `txs_run_test` sees a task that is neither the
/// test command nor the VM session.
pub trait TaskHandler: Send + Sync {
    /// Returns `true` to keep waiting, `false` to stop.
    fn handle_task(&self, task: &TaskRef, op: &str) -> bool;
}

/// Default policy: log an error and stop.
#[derive(Clone, Copy, Debug, Default)]
pub struct StopOnUnknownTask;

impl TaskHandler for StopOnUnknownTask {
    fn handle_task(&self, task: &TaskRef, op: &str) -> bool {
        tracing::error!("{op}: unknown task {} was returned", task.label());
        false
    }
}
