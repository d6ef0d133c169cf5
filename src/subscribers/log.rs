//! # LogWriter: renders harness events through `tracing`.
//!
//! ## Output format
//! ```text
//! [task-added] task="txs:exec"
//! [wait-timed-out] timeout_ms=30001
//! [retry-scheduled] task="open_session" attempt=2 delay_ms=6000 reason="invalid_state: ..."
//! [interface-dead] task="PAS-t-linux" reason="dead_interface: connection reset"
//! ```
//!
//! Failures (unexpected tasks, dead interfaces, exhausted retries, subscriber
//! problems) are logged at `warn`, everything else at `debug`.

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let task = e.task.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::UnexpectedTask
            | EventKind::InterfaceDead
            | EventKind::RetriesExhausted
            | EventKind::SubscriberOverflow
            | EventKind::SubscriberPanicked => {
                tracing::warn!(seq = e.seq, task, reason, attempt = ?e.attempt, "[{label}]");
            }
            EventKind::RetryScheduled => {
                tracing::info!(
                    seq = e.seq,
                    task,
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    reason,
                    "[{label}]"
                );
            }
            EventKind::WaitTimedOut | EventKind::CommandSubmitted => {
                tracing::debug!(seq = e.seq, task, timeout_ms = ?e.timeout_ms, "[{label}]");
            }
            _ => {
                tracing::debug!(seq = e.seq, task, reason, "[{label}]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
