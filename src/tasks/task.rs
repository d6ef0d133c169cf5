//! # Task abstraction.
//!
//! A [`Task`] is a cancelable, pollable completion signal. Concrete kinds (VM
//! session, remote command, COM file monitor, generic event) embed a
//! [`TaskCore`] and override [`Task::poll_locked`] / [`Task::cancel`] where their
//! behaviour differs. The common handle type is [`TaskRef`].
//!
//! ## Contract
//! - `signal` transitions pending → signalled once; later calls are no-ops.
//! - `poll` never blocks beyond the task lock. Polling tasks perform their check in
//!   `poll_locked` and may signal from there.
//! - `cancel` on a task without a natural cancellation path self-signals with
//!   [`TaskResult::Canceled`] so nobody waits forever; it returns `false` once the
//!   task has already signalled.
//! - `result` returns `None` until the task signalled.
//!
//! # Example
//! ```
//! use vmharness::{EventTask, Task, TaskResult};
//!
//! let task = EventTask::new("guest-ready");
//! assert!(!task.poll());
//! assert!(task.signal(TaskResult::Flag(true)));
//! assert!(!task.cancel());
//! assert_eq!(task.result(), Some(TaskResult::Flag(true)));
//! ```

use std::sync::Arc;

use super::{TaskCore, TaskId, TaskResult, TaskState};

/// Cancelable, pollable unit of asynchronous work.
pub trait Task: Send + Sync + 'static {
    /// Shared state embedded by the implementation.
    fn core(&self) -> &TaskCore;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Unique instance identity.
    fn id(&self) -> TaskId {
        self.core().id()
    }

    /// `name#id`, used in log lines and event payloads.
    fn label(&self) -> String {
        format!("{}{}", self.name(), self.id())
    }

    /// Signals the task with `result`. Returns `false` if it had already signalled.
    fn signal(&self, result: TaskResult) -> bool {
        self.core().signal(result)
    }

    /// Poll with the task lock already held by the caller.
    ///
    /// Polling-style tasks override this to perform their check; they must only
    /// mutate through `state` (or data guarded by it).
    fn poll_locked(&self, state: &mut TaskState) -> bool {
        state.is_signalled()
    }

    /// Returns whether the task is signalled, refreshing derived state first.
    fn poll(&self) -> bool {
        let mut state = self.core().lock();
        self.poll_locked(&mut state)
    }

    /// Requests early termination; returns whether the request was accepted.
    fn cancel(&self) -> bool {
        self.signal(TaskResult::Canceled)
    }

    /// The stored result, `None` while pending.
    fn result(&self) -> Option<TaskResult> {
        self.core().result()
    }
}

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

impl dyn Task {
    /// Identity comparison (same task instance).
    #[inline]
    pub fn is(&self, other: &dyn Task) -> bool {
        self.id() == other.id()
    }
}

impl std::fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<task {}{}>", self.name(), self.id())
    }
}
