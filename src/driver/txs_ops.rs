//! # TXS flows of the driver.
//!
//! Every remote command is waited for together with the VM session task, so a
//! VM that dies mid-command ends the wait at once instead of running into the
//! command timeout.
//!
//! ```text
//! txs_do_task(session, txs, op, timeout, ignore_errors)
//!   ├─► txs.submit(op) ── None ──► SubmitRejected
//!   ├─► waiter.add(command), waiter.add(session)
//!   └─► wait_for_any(timeout + 1ms)
//!         ├─ command  ─► result (failure reply ─► CommandFailed)
//!         ├─ session  ─► cancel command, report premature termination ─► VmTerminated
//!         ├─ other    ─► cancel command ─► UnexpectedTask
//!         └─ None     ─► cancel command ─► Timeout
//! ```
//!
//! `ignore_errors` only lowers how timeouts and failure replies are logged; the
//! outcome is returned as an error either way.
//!
//! The compound flows build on it:
//! - [`Driver::txs_connect`] / [`Driver::start_vm_and_connect`]
//! - [`Driver::txs_cd_wait`]
//! - [`Driver::txs_reboot_and_reconnect`] (reboot confirmed by a UUID change)
//! - [`Driver::txs_run_test`]
//! - [`Driver::monitor_com_file`] / [`Driver::run_vm_and_monitor_com_file`]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::{Driver, TaskHandler, VmSessionTask};
use crate::error::HarnessError;
use crate::events::{Event, EventKind};
use crate::tasks::{ComFileMonitor, Task, TaskRef, TaskResult};
use crate::txs::{CommandOp, ConnectTask, TxsSession};

/// File probed on the validation CD when no other file is given.
pub const DEFAULT_CD_FILE: &str = "valkit.txt";

/// Upper bound for the UUID query that precedes a reboot.
const UUID_BEFORE_REBOOT: Duration = Duration::from_secs(60);

/// Lower bound for a single CD probe.
const MIN_CD_PROBE: Duration = Duration::from_millis(500);

/// Extra slack the waiter gets over the command's own timeout.
const WAIT_SLACK: Duration = Duration::from_millis(1);

/// Failure text of a completed command, if it did not succeed.
fn command_failure(result: &TaskResult) -> Option<String> {
    match result {
        TaskResult::ExitStatus(rc) if *rc != 0 => Some(format!("exit status {rc}")),
        other => other.failure().map(str::to_string),
    }
}

fn remaining(deadline: Option<Instant>) -> Duration {
    deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()))
}

impl Driver {
    fn cancel_task(&self, task: &dyn Task) {
        if task.cancel() {
            self.bus
                .publish(Event::new(EventKind::TaskCanceled).with_task(task.label()));
        }
    }

    /// Waits until `task` or the VM session signals, whichever comes first.
    ///
    /// The session is added to the waiter for the duration of the call unless
    /// it already is a member. A pending `task` is canceled on any outcome but
    /// its own completion.
    pub(super) async fn wait_for_task_or_vm(
        &self,
        op: &str,
        task: TaskRef,
        session: &Arc<VmSessionTask>,
        timeout: Duration,
    ) -> Result<TaskResult, HarnessError> {
        let added_vm = self.waiter.add(session.clone());
        self.waiter.add(Arc::clone(&task));

        let returned = self
            .waiter
            .wait_for_any(timeout.saturating_add(WAIT_SLACK))
            .await;

        self.waiter.remove(&*task);
        if added_vm {
            self.waiter.remove(&**session);
        }

        match returned {
            Some(t) if t.is(&*task) => Ok(task.result().unwrap_or(TaskResult::Canceled)),
            Some(t) if t.is(&**session) => {
                self.cancel_task(&*task);
                session.report_premature_termination(op);
                Err(HarnessError::VmTerminated {
                    op: op.to_string(),
                    vm: session.vm_name().to_string(),
                })
            }
            Some(t) => {
                self.cancel_task(&*task);
                let label = t.label();
                tracing::error!("{op}: unknown/wrong task {label} was returned");
                self.bus.publish(
                    Event::new(EventKind::UnexpectedTask)
                        .with_task(label.clone())
                        .with_reason(op.to_string()),
                );
                Err(HarnessError::UnexpectedTask {
                    op: op.to_string(),
                    task: label,
                })
            }
            None => {
                self.cancel_task(&*task);
                Err(HarnessError::Timeout {
                    op: op.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Runs one TXS command while watching the VM.
    ///
    /// Returns the command's result on success. Timeouts, failure replies,
    /// VM termination and unexpected tasks are errors.
    pub async fn txs_do_task(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        op: CommandOp,
        timeout: Duration,
        ignore_errors: bool,
    ) -> Result<TaskResult, HarnessError> {
        let name = format!("txs_{}", op.name());
        tracing::debug!(op = %name, timeout = ?timeout, "txs_do_task");

        let Some(task) = txs.submit(op, timeout) else {
            tracing::error!("{name}: command was not accepted");
            return Err(HarnessError::SubmitRejected { op: name });
        };

        let err = match self.wait_for_task_or_vm(&name, task, session, timeout).await {
            Ok(result) => match command_failure(&result) {
                None => return Ok(result),
                Some(reason) => HarnessError::CommandFailed { op: name, reason },
            },
            Err(e) => e,
        };

        match &err {
            HarnessError::Timeout { .. } | HarnessError::CommandFailed { .. } if ignore_errors => {
                tracing::info!("{err}");
            }
            HarnessError::VmTerminated { .. } => {}
            _ => tracing::error!("{err}"),
        }
        Err(err)
    }

    fn wrapper_timeout(&self) -> Duration {
        self.cfg.command_timeout().unwrap_or(Duration::MAX)
    }

    async fn txs_simple(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        op: CommandOp,
    ) -> Result<TaskResult, HarnessError> {
        self.txs_do_task(session, txs, op, self.wrapper_timeout(), false)
            .await
    }

    /// UUID of the running TXS instance.
    pub async fn txs_uuid(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
    ) -> Result<String, HarnessError> {
        let timeout = self.wrapper_timeout();
        self.uuid_within(session, txs, timeout).await
    }

    async fn uuid_within(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        timeout: Duration,
    ) -> Result<String, HarnessError> {
        match self
            .txs_do_task(session, txs, CommandOp::Uuid, timeout, false)
            .await?
        {
            TaskResult::Text(uuid) => Ok(uuid),
            other => Err(HarnessError::CommandFailed {
                op: "txs_uuid".into(),
                reason: format!("unexpected reply {other}"),
            }),
        }
    }

    pub(super) async fn txs_reboot(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        self.txs_do_task(session, txs, CommandOp::Reboot, timeout, false)
            .await
            .map(drop)
    }

    /// Ends the TXS session.
    pub async fn txs_disconnect(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
    ) -> Result<(), HarnessError> {
        self.txs_simple(session, txs, CommandOp::Disconnect)
            .await
            .map(drop)
    }

    pub async fn txs_mkdir(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        path: &str,
        mode: u32,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::MkDir {
            path: path.to_string(),
            mode,
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    /// Creates `path` including missing parents.
    pub async fn txs_mkdir_path(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        path: &str,
        mode: u32,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::MkDirPath {
            path: path.to_string(),
            mode,
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    pub async fn txs_rm_file(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        path: &str,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::RmFile {
            path: path.to_string(),
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    /// Removes a guest directory tree.
    pub async fn txs_rm_tree(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        path: &str,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::RmTree {
            path: path.to_string(),
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    pub async fn txs_is_file(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        path: &str,
    ) -> Result<bool, HarnessError> {
        let op = CommandOp::IsFile {
            path: path.to_string(),
        };
        let result = self.txs_simple(session, txs, op).await?;
        Ok(result.as_flag().unwrap_or(false))
    }

    pub async fn txs_is_dir(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        path: &str,
    ) -> Result<bool, HarnessError> {
        let op = CommandOp::IsDir {
            path: path.to_string(),
        };
        let result = self.txs_simple(session, txs, op).await?;
        Ok(result.as_flag().unwrap_or(false))
    }

    /// Writes `content` to the guest file `remote`.
    pub async fn txs_upload_string(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        content: &str,
        remote: &str,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::UploadString {
            content: content.to_string(),
            remote: remote.to_string(),
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    /// Copies the host file `local` to the guest.
    pub async fn txs_upload_file(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        local: &Path,
        remote: &str,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::UploadFile {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    /// Copies the guest file `remote` to the host.
    pub async fn txs_download_file(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        remote: &str,
        local: impl Into<PathBuf>,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::DownloadFile {
            remote: remote.to_string(),
            local: local.into(),
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    /// Content of the guest file `remote`.
    pub async fn txs_download_string(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        remote: &str,
    ) -> Result<String, HarnessError> {
        let op = CommandOp::DownloadString {
            remote: remote.to_string(),
        };
        match self.txs_simple(session, txs, op).await? {
            TaskResult::Text(content) => Ok(content),
            other => Err(HarnessError::CommandFailed {
                op: "txs_download_string".into(),
                reason: format!("unexpected reply {other}"),
            }),
        }
    }

    /// Unpacks a guest archive into `dest`.
    pub async fn txs_unpack_file(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        archive: &str,
        dest: &str,
    ) -> Result<(), HarnessError> {
        let op = CommandOp::UnpackFile {
            archive: archive.to_string(),
            dest: dest.to_string(),
        };
        self.txs_simple(session, txs, op).await.map(drop)
    }

    /// Connects to the TXS in the guest of `session`.
    ///
    /// The connection attempt is waited for together with the VM, so a guest
    /// that dies while booting fails the call right away.
    pub async fn txs_connect(
        &self,
        session: &Arc<VmSessionTask>,
        timeout: Duration,
        nat: bool,
    ) -> Result<TxsSession, HarnessError> {
        const OP: &str = "txs_connect";
        tracing::info!(vm = session.vm_name(), nat, "{OP}: connecting (timeout {timeout:?})");

        let connector = self.api.txs_connector(session.handle(), nat).await?;
        let task = ConnectTask::start(connector, timeout, self.bus.clone());
        let result = self
            .wait_for_task_or_vm(OP, task.clone(), session, timeout)
            .await
            .inspect_err(|e| tracing::error!("{e}"))?;

        match (result, task.take_session()) {
            (TaskResult::Done, Some(txs)) => {
                tracing::info!(vm = session.vm_name(), host = %txs.hostname(), "{OP}: connected");
                Ok(txs)
            }
            (other, _) => {
                let reason = other.failure().unwrap_or("no session").to_string();
                tracing::error!("{OP}: {reason}");
                Err(HarnessError::CommandFailed {
                    op: OP.into(),
                    reason,
                })
            }
        }
    }

    /// Waits for the guest CD-ROM to become readable by probing for `file` on it.
    ///
    /// Each probe gets the time left (at least 500ms); failed probes are
    /// repeated after `cd_wait_interval`.
    pub async fn txs_cd_wait(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        timeout: Duration,
        file: &str,
    ) -> Result<(), HarnessError> {
        const OP: &str = "txs_cd_wait";
        let path = format!("${{CDROM}}/{file}");
        let started = Instant::now();
        let deadline = started.checked_add(timeout);

        loop {
            let probe = remaining(deadline).max(MIN_CD_PROBE);
            let op = CommandOp::IsFile { path: path.clone() };
            match self.txs_do_task(session, txs, op, probe, true).await {
                Ok(TaskResult::Flag(true)) => {
                    tracing::debug!("{OP}: {path} found after {:?}", started.elapsed());
                    return Ok(());
                }
                Ok(_) | Err(HarnessError::CommandFailed { .. }) | Err(HarnessError::Timeout { .. }) => {}
                Err(e) => {
                    tracing::error!("{OP}: {e}");
                    return Err(e);
                }
            }

            if started.elapsed() >= timeout {
                tracing::error!("{OP}: timed out");
                return Err(HarnessError::Timeout {
                    op: OP.into(),
                    timeout,
                });
            }
            tokio::time::sleep(self.cfg.cd_wait_interval).await;
        }
    }

    /// Starts `vm` and connects to its TXS, optionally waiting for `cd_file`
    /// on the validation CD.
    ///
    /// The VM is terminated again when any step fails.
    pub async fn start_vm_and_connect(
        &self,
        vm: &str,
        timeout: Duration,
        nat: bool,
        cd_file: Option<&str>,
    ) -> Result<(Arc<VmSessionTask>, TxsSession), HarnessError> {
        let session = self.start_vm(vm).await?;
        let deadline = Instant::now().checked_add(timeout);

        let connected = match self.txs_connect(&session, timeout, nat).await {
            Ok(txs) => match cd_file {
                Some(file) => self
                    .txs_cd_wait(&session, &txs, remaining(deadline), file)
                    .await
                    .map(|()| txs),
                None => Ok(txs),
            },
            Err(e) => Err(e),
        };

        match connected {
            Ok(txs) => Ok((session, txs)),
            Err(e) => {
                if let Err(te) = self.terminate_vm(&session).await {
                    tracing::error!(vm, error = %te, "terminate_vm failed after a failed start");
                }
                Err(e)
            }
        }
    }

    /// Reboots the guest and connects to the TXS of the new boot.
    ///
    /// The reboot is confirmed by comparing the TXS UUID before and after; an
    /// unchanged UUID fails with [`HarnessError::NotRebooted`]. Behind NAT the
    /// port forwarding is given `nat_settle` before reconnecting.
    pub async fn txs_reboot_and_reconnect(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        timeout: Duration,
        nat: bool,
        cd_file: Option<&str>,
    ) -> Result<TxsSession, HarnessError> {
        let deadline = Instant::now().checked_add(timeout);

        let before = self
            .uuid_within(session, txs, UUID_BEFORE_REBOOT.min(timeout))
            .await?;
        tracing::info!(vm = session.vm_name(), "rebooting guest (uuid {before})");
        self.txs_reboot(session, txs, remaining(deadline)).await?;

        if nat && !self.cfg.nat_settle.is_zero() {
            self.sleep(self.cfg.nat_settle).await;
        }

        let txs = self
            .txs_connect(session, remaining(deadline), nat)
            .await?;
        let after = self
            .uuid_within(session, &txs, remaining(deadline))
            .await?;
        if after == before {
            tracing::error!(vm = session.vm_name(), "guest did not reboot (uuid {before})");
            return Err(HarnessError::NotRebooted { uuid: before });
        }
        self.bus.publish(
            Event::new(EventKind::GuestRebooted)
                .with_task(session.vm_name().to_string())
                .with_reason(format!("{before} -> {after}")),
        );

        if let Some(file) = cd_file {
            self.txs_cd_wait(session, &txs, remaining(deadline), file)
                .await?;
        }
        Ok(txs)
    }

    /// Runs a test program in the guest and waits for it to exit.
    ///
    /// Tasks other than the command and the VM are passed to `handler`; it must
    /// remove tasks it wants to keep waiting past, as they stay signalled.
    pub async fn txs_run_test(
        &self,
        session: &Arc<VmSessionTask>,
        txs: &TxsSession,
        test_name: &str,
        timeout: Duration,
        op: CommandOp,
        handler: &dyn TaskHandler,
    ) -> Result<TaskResult, HarnessError> {
        const OP: &str = "txs_run_test";
        tracing::info!(test = test_name, "{OP}: starting ({})", op.name());

        let Some(task) = txs.submit(op, timeout) else {
            tracing::error!("{OP}: {test_name}: command was not accepted");
            return Err(HarnessError::SubmitRejected { op: OP.into() });
        };
        let deadline = Instant::now().checked_add(timeout.saturating_add(WAIT_SLACK));
        let added_vm = self.waiter.add(session.clone());
        self.waiter.add(task.clone());

        let outcome = loop {
            let Some(t) = self.waiter.wait_for_any(remaining(deadline)).await else {
                tracing::error!("{OP}: {test_name}: timed out after {timeout:?}");
                break Err(HarnessError::Timeout {
                    op: OP.into(),
                    timeout,
                });
            };
            if t.is(&*task) {
                let result = task.result().unwrap_or(TaskResult::Canceled);
                break match command_failure(&result) {
                    None => {
                        tracing::info!(test = test_name, "{OP}: {result}");
                        Ok(result)
                    }
                    Some(reason) => {
                        tracing::error!(test = test_name, "{OP}: {reason}");
                        Err(HarnessError::CommandFailed {
                            op: OP.into(),
                            reason,
                        })
                    }
                };
            }
            if t.is(&**session) {
                session.report_premature_termination(OP);
                break Err(HarnessError::VmTerminated {
                    op: OP.into(),
                    vm: session.vm_name().to_string(),
                });
            }
            if !handler.handle_task(&t, OP) {
                break Err(HarnessError::UnexpectedTask {
                    op: OP.into(),
                    task: t.label(),
                });
            }
        };

        self.waiter.remove(&*task);
        if added_vm {
            self.waiter.remove(&**session);
        }
        if !task.poll() {
            self.cancel_task(&*task);
        }
        outcome
    }

    /// Watches the raw serial output file `path` until a stop word shows up.
    ///
    /// Returns the matched word. `stop_words` defaults to
    /// [`DEFAULT_STOP_WORDS`](crate::DEFAULT_STOP_WORDS).
    pub async fn monitor_com_file(
        &self,
        session: &Arc<VmSessionTask>,
        path: impl Into<PathBuf>,
        timeout: Duration,
        stop_words: Option<&[&str]>,
    ) -> Result<String, HarnessError> {
        const OP: &str = "monitor_com_file";
        let monitor = Arc::new(ComFileMonitor::new(path, stop_words)?);
        tracing::info!(path = %monitor.path().display(), "{OP}: waiting for a stop word");

        let result = self
            .wait_for_task_or_vm(OP, monitor.clone(), session, timeout)
            .await
            .inspect_err(|e| tracing::error!("{e}"))?;
        match result {
            TaskResult::Text(word) => Ok(word),
            other => Err(HarnessError::CommandFailed {
                op: OP.into(),
                reason: other.to_string(),
            }),
        }
    }

    /// Starts `vm`, monitors its serial output file, and terminates it again.
    pub async fn run_vm_and_monitor_com_file(
        &self,
        vm: &str,
        path: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<String, HarnessError> {
        let session = self.start_vm(vm).await?;
        let outcome = self.monitor_com_file(&session, path, timeout, None).await;
        if let Err(e) = self.terminate_vm(&session).await {
            tracing::error!(vm, error = %e, "terminate_vm failed");
        }
        outcome
    }
}
