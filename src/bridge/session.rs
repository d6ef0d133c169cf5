//! # Session event handler.
//!
//! Wakes the task machinery when the VM behind a session changes state:
//! - any machine state change interrupts the waiter so it re-checks its members;
//! - a terminal state (powered off, saved, aborted, teleported) signals the
//!   VM session task;
//! - a runtime error is logged, flags host memory pressure when that is the
//!   error id, signals the session task and interrupts the waiter.

use std::sync::Weak;

use super::{EventHandler, MachineState, SessionState};
use crate::core::Waiter;
use crate::driver::VmSessionTask;
use crate::tasks::{Task, TaskResult};

/// Runtime error id reported when the host runs short of memory.
pub const HOST_MEMORY_LOW: &str = "HostMemoryLow";

/// Handler registered for every started VM.
pub struct SessionEventHandler {
    name: String,
    session: Weak<VmSessionTask>,
    waiter: Weak<Waiter>,
}

impl SessionEventHandler {
    pub fn new(name: impl Into<String>, session: Weak<VmSessionTask>, waiter: Weak<Waiter>) -> Self {
        Self {
            name: name.into(),
            session,
            waiter,
        }
    }

    fn interrupt(&self) {
        if let Some(waiter) = self.waiter.upgrade() {
            waiter.interrupt();
        }
    }
}

impl EventHandler for SessionEventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_machine_state_change(&self, machine_id: &str, state: MachineState) {
        tracing::debug!(vm = %self.name, machine_id, ?state, "machine state changed");
        if state.is_terminal() {
            if let Some(session) = self.session.upgrade() {
                session.signal(TaskResult::Text(state.as_str().to_string()));
            }
        }
        self.interrupt();
    }

    fn on_session_state_change(&self, machine_id: &str, state: SessionState) {
        tracing::trace!(vm = %self.name, machine_id, ?state, "session state changed");
    }

    fn on_runtime_error(&self, fatal: bool, id: &str, message: &str) {
        tracing::info!(
            "onRuntimeError/{}: fatal={} id={} message={}",
            self.name,
            fatal,
            id,
            message
        );
        if let Some(session) = self.session.upgrade() {
            if id == HOST_MEMORY_LOW {
                session.signal_host_memory_low();
            }
            session.signal(TaskResult::Failed(format!("runtime error {id}: {message}")));
        }
        self.interrupt();
    }
}
