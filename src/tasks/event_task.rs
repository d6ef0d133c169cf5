//! # Externally signalled task.
//!
//! [`EventTask`] has no work of its own: some other component (an event handler,
//! a helper thread, a test) calls [`Task::signal`]. Cancelling it simply signals
//! [`TaskResult::Canceled`].

use std::sync::Arc;

use super::{Task, TaskCore};

/// Generic task completed by someone else calling `signal`.
#[derive(Debug)]
pub struct EventTask {
    core: TaskCore,
}

impl EventTask {
    /// Creates a pending task.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            core: TaskCore::new(name),
        }
    }

    /// Creates a pending task behind an `Arc`.
    pub fn arc(name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }
}

impl Task for EventTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskRef, TaskResult};

    #[test]
    fn test_cancel_self_signals() {
        let t = EventTask::new("e");
        assert!(t.cancel());
        assert!(t.poll());
        assert_eq!(t.result(), Some(TaskResult::Canceled));
        assert!(!t.cancel());
    }

    #[test]
    fn test_identity() {
        let a: TaskRef = EventTask::arc("same-name");
        let b: TaskRef = EventTask::arc("same-name");
        assert!(a.is(&*a));
        assert!(!a.is(&*b));
        assert!(a.label().starts_with("same-name#"));
    }
}
