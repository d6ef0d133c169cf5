//! # Shared task state: identity, signal flag, result and wake targets.
//!
//! Every task embeds one [`TaskCore`]. Its mutex guards the whole [`TaskState`]:
//! the `pending → signalled` transition, the result, and the list of waiters to
//! wake. Polling-style tasks do their check while holding the same lock, so a
//! signal can never interleave with a waiter's membership check.
//!
//! ## Rules
//! - `signalled` is monotonic; a second `signal` returns `false` and changes nothing.
//! - The result is stored in the same critical section as the transition.
//! - Registering a task in a waiter that finds it already signalled wakes that
//!   waiter immediately (no missed wakeup).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use super::TaskResult;
use crate::core::WakeHub;

static TASK_IDS: AtomicU64 = AtomicU64::new(1);

/// Unique task instance identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        TaskId(TASK_IDS.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lock-guarded part of a task.
#[derive(Default)]
pub struct TaskState {
    signalled: bool,
    result: Option<TaskResult>,
    hubs: Vec<Weak<WakeHub>>,
}

impl TaskState {
    /// Whether the task has signalled.
    #[inline]
    pub fn is_signalled(&self) -> bool {
        self.signalled
    }

    /// The stored result (`None` while pending).
    #[inline]
    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    /// Transitions to signalled with `result` and wakes all attached waiters.
    ///
    /// Returns `false` (and keeps the first result) if already signalled.
    pub fn signal(&mut self, result: TaskResult) -> bool {
        if self.signalled {
            return false;
        }
        self.result = Some(result);
        self.signalled = true;
        self.hubs.retain(|hub| match hub.upgrade() {
            Some(hub) => {
                hub.wake();
                true
            }
            None => false,
        });
        true
    }

    pub(crate) fn attach(&mut self, hub: &Arc<WakeHub>) {
        self.hubs
            .retain(|h| h.strong_count() > 0 && !std::ptr::eq(h.as_ptr(), Arc::as_ptr(hub)));
        self.hubs.push(Arc::downgrade(hub));
        if self.signalled {
            hub.wake();
        }
    }

    pub(crate) fn detach(&mut self, hub: &Arc<WakeHub>) {
        self.hubs
            .retain(|h| h.strong_count() > 0 && !std::ptr::eq(h.as_ptr(), Arc::as_ptr(hub)));
    }
}

/// Identity plus lock-guarded state, embedded by every task kind.
pub struct TaskCore {
    id: TaskId,
    name: Arc<str>,
    state: Mutex<TaskState>,
}

impl TaskCore {
    /// Creates a pending core with a fresh id.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: TaskId::next(),
            name: name.into(),
            state: Mutex::new(TaskState::default()),
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the task lock.
    pub fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock()
    }

    /// Locks and signals; see [`TaskState::signal`].
    pub fn signal(&self, result: TaskResult) -> bool {
        self.state.lock().signal(result)
    }

    pub fn is_signalled(&self) -> bool {
        self.state.lock().is_signalled()
    }

    /// Snapshot of the stored result; never blocks on anything but the task lock.
    pub fn result(&self) -> Option<TaskResult> {
        self.state.lock().result.clone()
    }
}

impl fmt::Debug for TaskCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("TaskCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("signalled", &st.signalled)
            .field("result", &st.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_is_idempotent() {
        let core = TaskCore::new("t");
        assert!(core.result().is_none());
        assert!(core.signal(TaskResult::ExitStatus(7)));
        assert!(!core.signal(TaskResult::ExitStatus(9)));
        assert!(!core.signal(TaskResult::Canceled));
        assert!(core.is_signalled());
        assert_eq!(core.result(), Some(TaskResult::ExitStatus(7)));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = TaskCore::new("a");
        let b = TaskCore::new("a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_attach_to_signalled_task_wakes_hub() {
        let hub = Arc::new(WakeHub::default());
        let core = TaskCore::new("t");
        core.signal(TaskResult::Done);
        let before = hub.generation();
        core.lock().attach(&hub);
        assert!(hub.generation() > before);
    }

    #[test]
    fn test_detach_stops_wakeups() {
        let hub = Arc::new(WakeHub::default());
        let core = TaskCore::new("t");
        core.lock().attach(&hub);
        core.lock().detach(&hub);
        let before = hub.generation();
        core.signal(TaskResult::Done);
        assert_eq!(hub.generation(), before);
    }
}
