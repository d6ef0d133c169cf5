//! Error types used by the harness.
//!
//! This module defines three error families:
//!
//! - [`RemoteError`] failures reported by the remote object API adapter, classified
//!   by a single [`RemoteErrorKind`] regardless of the underlying transport;
//! - [`TransportError`] failures of the in-guest command transport (TXS);
//! - [`HarnessError`] outcomes of driver-level operations (timeouts, unexpected
//!   tasks, VM terminations, exhausted retries).
//!
//! All of them provide `as_label` (stable snake_case label for logs/events) and
//! `as_message`. Task and waiter primitives never return these for ordinary
//! timeout/cancel outcomes; they use sentinel values instead.

use std::time::Duration;
use thiserror::Error;

/// Classification of a remote API failure.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The connection to the remote object is permanently gone.
    DeadInterface,
    /// The caller is not allowed to read/modify the object (e.g. session state of a foreign VM).
    AccessDenied,
    /// The object is not in a state that permits the call (session still locked, VM running, ...).
    InvalidState,
    /// The referenced object does not exist.
    NotFound,
    /// The remote side raised an unexpected error.
    Unexpected,
    /// Any other ordinary call failure.
    Failed,
}

impl RemoteErrorKind {
    /// Returns a short stable label (snake_case).
    pub fn as_label(&self) -> &'static str {
        match self {
            RemoteErrorKind::DeadInterface => "dead_interface",
            RemoteErrorKind::AccessDenied => "access_denied",
            RemoteErrorKind::InvalidState => "invalid_state",
            RemoteErrorKind::NotFound => "not_found",
            RemoteErrorKind::Unexpected => "unexpected",
            RemoteErrorKind::Failed => "failed",
        }
    }
}

/// # Error returned by the remote object API adapter.
///
/// The adapter folds whatever its transport raises into one [`RemoteErrorKind`]
/// plus a message, so callers can tell a dead interface apart from an ordinary
/// failed call.
///
/// # Example
/// ```
/// use vmharness::{RemoteError, RemoteErrorKind};
///
/// let err = RemoteError::dead("connection reset");
/// assert_eq!(err.kind, RemoteErrorKind::DeadInterface);
/// assert!(err.is_dead_interface());
/// assert!(!err.is_retryable());
/// assert_eq!(err.to_string(), "dead_interface: connection reset");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}: {}", .kind.as_label(), .message)]
pub struct RemoteError {
    /// Failure classification.
    pub kind: RemoteErrorKind,
    /// Adapter supplied details.
    pub message: String,
}

impl RemoteError {
    /// Creates an error of the given kind.
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a [`RemoteErrorKind::DeadInterface`] error.
    pub fn dead(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::DeadInterface, message)
    }

    /// Shorthand for a [`RemoteErrorKind::Failed`] error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Failed, message)
    }

    /// True if the connection is permanently unusable.
    pub fn is_dead_interface(&self) -> bool {
        self.kind == RemoteErrorKind::DeadInterface
    }

    /// Indicates whether retrying the same call in place may help.
    ///
    /// A dead interface is terminal for the connection and is never retried.
    pub fn is_retryable(&self) -> bool {
        !self.is_dead_interface()
    }

    /// Returns a short stable label (snake_case).
    pub fn as_label(&self) -> &'static str {
        self.kind.as_label()
    }

    /// Returns a human-readable message.
    pub fn as_message(&self) -> String {
        format!("remote {}: {}", self.kind.as_label(), self.message)
    }
}

/// # Errors produced by the in-guest command transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport has been torn down; no more commands can be exchanged.
    #[error("transport disconnected")]
    Disconnected,

    /// The remote side answered with a failure reply.
    #[error("command failed: {reason}")]
    Failed {
        /// The failure reply text.
        reason: String,
    },

    /// The command did not complete within its own protocol timeout.
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Establishing the connection failed.
    #[error("connect failed: {reason}")]
    Connect {
        /// The underlying reason.
        reason: String,
    },
}

impl TransportError {
    /// Returns a short stable label (snake_case).
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Disconnected => "transport_disconnected",
            TransportError::Failed { .. } => "transport_failed",
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::Connect { .. } => "transport_connect",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TransportError::Disconnected => "disconnected".to_string(),
            TransportError::Failed { reason } => format!("failed: {reason}"),
            TransportError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            TransportError::Connect { reason } => format!("connect: {reason}"),
        }
    }
}

/// # Outcomes of driver operations that did not succeed.
///
/// Every variant names the operation (`op`) so the report identifies which
/// step failed and why: timeout, explicit failure, or unexpected completion.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Nothing completed before the deadline.
    #[error("{op}: timed out after {timeout:?}")]
    Timeout {
        /// Operation name.
        op: String,
        /// The deadline that passed.
        timeout: Duration,
    },

    /// The command completed but reported a failure.
    #[error("{op}: command failed: {reason}")]
    CommandFailed {
        /// Operation name.
        op: String,
        /// Failure reply.
        reason: String,
    },

    /// The VM session task signalled while waiting for something else.
    #[error("{op}: VM '{vm}' terminated unexpectedly")]
    VmTerminated {
        /// Operation name.
        op: String,
        /// VM name.
        vm: String,
    },

    /// The waiter returned a task the current step did not expect.
    #[error("{op}: unknown/wrong task '{task}' was returned")]
    UnexpectedTask {
        /// Operation name.
        op: String,
        /// Name of the task that completed.
        task: String,
    },

    /// The transport refused to accept the command.
    #[error("{op}: command was not accepted")]
    SubmitRejected {
        /// Operation name.
        op: String,
    },

    /// A racy operation kept failing until the attempt budget ran out.
    #[error("{op}: giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Operation name.
        op: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last failure.
        #[source]
        last: RemoteError,
    },

    /// A reboot was acknowledged but the guest identity did not change.
    #[error("guest did not reboot (UUID {uuid} unchanged)")]
    NotRebooted {
        /// The unchanged UUID.
        uuid: String,
    },

    /// A remote API call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The command transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A stop-word pattern could not be compiled.
    #[error("invalid stop word pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl HarnessError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    ///
    /// # Example
    /// ```
    /// use vmharness::HarnessError;
    /// use std::time::Duration;
    ///
    /// let err = HarnessError::Timeout { op: "txs_uuid".into(), timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "harness_timeout");
    /// assert!(err.is_timeout());
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HarnessError::Timeout { .. } => "harness_timeout",
            HarnessError::CommandFailed { .. } => "harness_command_failed",
            HarnessError::VmTerminated { .. } => "harness_vm_terminated",
            HarnessError::UnexpectedTask { .. } => "harness_unexpected_task",
            HarnessError::SubmitRejected { .. } => "harness_submit_rejected",
            HarnessError::RetriesExhausted { .. } => "harness_retries_exhausted",
            HarnessError::NotRebooted { .. } => "harness_not_rebooted",
            HarnessError::Remote(e) => e.as_label(),
            HarnessError::Transport(e) => e.as_label(),
            HarnessError::Pattern(_) => "harness_pattern",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            HarnessError::Remote(e) => e.as_message(),
            HarnessError::Transport(e) => e.as_message(),
            other => other.to_string(),
        }
    }

    /// True for the distinguished "nothing completed in time" outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }

    /// True if the error stems from a dead remote interface.
    pub fn is_dead_interface(&self) -> bool {
        match self {
            HarnessError::Remote(e) => e.is_dead_interface(),
            HarnessError::RetriesExhausted { last, .. } => last.is_dead_interface(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_interface_is_not_retryable() {
        let err = RemoteError::dead("gone");
        assert!(err.is_dead_interface());
        assert!(!err.is_retryable());

        let err = RemoteError::new(RemoteErrorKind::InvalidState, "locked");
        assert!(err.is_retryable());
        assert_eq!(err.as_label(), "invalid_state");
    }

    #[test]
    fn test_harness_error_labels_and_messages() {
        let err = HarnessError::VmTerminated {
            op: "txs_do_task".into(),
            vm: "t-win10".into(),
        };
        assert_eq!(err.as_label(), "harness_vm_terminated");
        assert_eq!(
            err.to_string(),
            "txs_do_task: VM 't-win10' terminated unexpectedly"
        );

        let err: HarnessError = RemoteError::dead("reset").into();
        assert!(err.is_dead_interface());
        assert_eq!(err.as_label(), "dead_interface");
        assert_eq!(err.as_message(), "remote dead_interface: reset");
    }
}
