//! # Task result payloads.
//!
//! A task's payload depends on what the task tracks: an exit status for guest
//! processes, a flag for queries (`is_file`), a byte count for transfers, text for
//! UUIDs/downloads/stop words. [`TaskResult`] is the one tagged type shared by all
//! task kinds so that the waiter can stay type-agnostic.

use std::fmt;

/// Result stored in a task when it signals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskResult {
    /// Completed without a payload.
    Done,
    /// Boolean answer.
    Flag(bool),
    /// Guest process exit status.
    ExitStatus(i32),
    /// Number of bytes transferred.
    Bytes(u64),
    /// Text payload.
    Text(String),
    /// The operation completed with a failure.
    Failed(String),
    /// The task was canceled before it completed on its own.
    Canceled,
}

impl TaskResult {
    /// True unless the result reports a failure or a cancellation.
    pub fn is_success(&self) -> bool {
        !matches!(self, TaskResult::Failed(_) | TaskResult::Canceled)
    }

    /// The failure text, if any.
    pub fn failure(&self) -> Option<&str> {
        match self {
            TaskResult::Failed(reason) => Some(reason),
            TaskResult::Canceled => Some("canceled"),
            _ => None,
        }
    }

    /// The text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TaskResult::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean payload, if any.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            TaskResult::Flag(f) => Some(*f),
            _ => None,
        }
    }

    /// The exit status, if any.
    pub fn as_exit_status(&self) -> Option<i32> {
        match self {
            TaskResult::ExitStatus(rc) => Some(*rc),
            _ => None,
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Done => f.write_str("done"),
            TaskResult::Flag(v) => write!(f, "flag={v}"),
            TaskResult::ExitStatus(rc) => write!(f, "exit={rc}"),
            TaskResult::Bytes(n) => write!(f, "bytes={n}"),
            TaskResult::Text(s) => write!(f, "text={s:?}"),
            TaskResult::Failed(reason) => write!(f, "failed: {reason}"),
            TaskResult::Canceled => f.write_str("canceled"),
        }
    }
}
