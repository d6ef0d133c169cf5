//! # Remote command task.
//!
//! [`RemoteCommandTask`] is one outstanding TXS request. The request runs as a
//! tokio job which signals the task with the transport's answer.
//!
//! ```text
//! TxsSession::submit(op) ──► spawn job:
//!     select! {
//!         transport.execute(op, timeout) ──► signal(result | Failed(err))
//!         abort token cancelled          ──► transport.abort() ──► signal(Canceled | Failed)
//!     }
//! ```
//!
//! Many command tasks may share one transport; each completes on its own.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{CommandOp, CommandTransport};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Task, TaskCore, TaskResult};

const DISCONNECTED: &str = "transport disconnected";

/// A task tracking one TXS command.
pub struct RemoteCommandTask {
    core: TaskCore,
    op: CommandOp,
    timeout: Duration,
    transport: Arc<dyn CommandTransport>,
    abort: CancellationToken,
}

impl RemoteCommandTask {
    pub(crate) fn spawn(
        op: CommandOp,
        timeout: Duration,
        transport: Arc<dyn CommandTransport>,
        bus: Bus,
    ) -> Arc<Self> {
        let task = Arc::new(Self {
            core: TaskCore::new(format!("txs:{}", op.name())),
            op,
            timeout,
            transport,
            abort: CancellationToken::new(),
        });

        let job = Arc::clone(&task);
        tokio::spawn(async move {
            let result = tokio::select! {
                r = job.transport.execute(&job.op, job.timeout) => match r {
                    Ok(result) => result,
                    Err(e) => TaskResult::Failed(e.to_string()),
                },
                _ = job.abort.cancelled() => {
                    if job.transport.is_connected() {
                        match job.transport.abort().await {
                            Ok(()) => TaskResult::Canceled,
                            Err(e) => TaskResult::Failed(format!("abort failed: {e}")),
                        }
                    } else {
                        TaskResult::Failed(DISCONNECTED.into())
                    }
                }
            };
            let reason = result.to_string();
            if job.signal(result) {
                bus.publish(
                    Event::new(EventKind::CommandCompleted)
                        .with_task(job.label())
                        .with_reason(reason),
                );
            }
        });
        task
    }

    /// The request this task tracks.
    pub fn op(&self) -> &CommandOp {
        &self.op
    }

    /// The protocol timeout given to the transport.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True once the command completed successfully.
    pub fn is_success(&self) -> bool {
        self.result().is_some_and(|r| r.is_success())
    }

    /// Failure text of a completed command, if it failed.
    pub fn last_reply(&self) -> Option<String> {
        self.result()
            .and_then(|r| r.failure().map(str::to_string))
    }
}

impl Task for RemoteCommandTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    /// Sends a protocol abort for the request in flight.
    ///
    /// When the transport is already gone nothing can be aborted remotely: the
    /// task fails locally and the job is released without a protocol abort.
    fn cancel(&self) -> bool {
        if self.core.is_signalled() {
            return false;
        }
        if !self.transport.is_connected() {
            let accepted = self.signal(TaskResult::Failed(DISCONNECTED.into()));
            self.abort.cancel();
            return accepted;
        }
        self.abort.cancel();
        true
    }
}

impl std::fmt::Debug for RemoteCommandTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCommandTask")
            .field("core", &self.core)
            .field("op", &self.op.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
