//! # VM session task.
//!
//! [`VmSessionTask`] represents a running VM. It signals when the VM goes away
//! (terminal machine state, runtime error, or teardown by the driver), which is
//! what lets every wait notice a dying VM. The VM's event listener is owned by
//! the task so it never outlives the session it listens on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::SessionHandle;
use crate::bridge::EventListener;
use crate::tasks::{Task, TaskCore};

/// Task tracking the lifetime of one started VM.
pub struct VmSessionTask {
    core: TaskCore,
    handle: SessionHandle,
    host_memory_low: AtomicBool,
    listener: Mutex<Option<EventListener>>,
}

impl VmSessionTask {
    pub fn new(handle: SessionHandle) -> Arc<Self> {
        Arc::new(Self {
            core: TaskCore::new(format!("vm:{}", handle.vm_name)),
            handle,
            host_memory_low: AtomicBool::new(false),
            listener: Mutex::new(None),
        })
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn vm_name(&self) -> &str {
        &self.handle.vm_name
    }

    /// Records that the VM reported host memory pressure.
    pub fn signal_host_memory_low(&self) {
        self.host_memory_low.store(true, Ordering::Release);
    }

    pub fn is_host_memory_low(&self) -> bool {
        self.host_memory_low.load(Ordering::Acquire)
    }

    pub(crate) fn set_listener(&self, listener: EventListener) {
        *self.listener.lock() = Some(listener);
    }

    /// Unregisters the VM's event listener, joining its worker.
    ///
    /// Returns `false` if there was none or unregistering failed.
    pub async fn unregister_listener(&self) -> bool {
        let listener = self.listener.lock().take();
        match listener {
            Some(listener) => listener.unregister(true).await,
            None => false,
        }
    }

    /// Logs why the VM ended while `op` was waiting on something else.
    pub fn report_premature_termination(&self, op: &str) {
        let why = self
            .result()
            .map_or_else(|| "still running".to_string(), |r| r.to_string());
        tracing::error!(
            vm = %self.handle.vm_name,
            pid = ?self.handle.pid,
            host_memory_low = self.is_host_memory_low(),
            "{op}: the VM terminated prematurely ({why})"
        );
    }
}

impl Task for VmSessionTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }
}

impl std::fmt::Debug for VmSessionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmSessionTask")
            .field("core", &self.core)
            .field("handle", &self.handle)
            .field("host_memory_low", &self.is_host_memory_low())
            .finish()
    }
}
