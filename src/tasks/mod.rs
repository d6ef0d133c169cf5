//! # Task abstractions and the generic task kinds.
//!
//! - [`Task`] trait implemented by every waitable operation
//! - [`TaskRef`] shared handle (`Arc<dyn Task>`)
//! - [`TaskCore`] / [`TaskState`] identity, lock and signal state embedded by tasks
//! - [`TaskResult`] tagged result payload
//! - [`EventTask`] externally signalled task
//! - [`ComFileMonitor`] polling task watching a COM output file
//!
//! Task kinds bound to other subsystems live with them:
//! [`RemoteCommandTask`](crate::RemoteCommandTask), [`ConnectTask`](crate::ConnectTask)
//! and [`VmSessionTask`](crate::VmSessionTask).

mod core;
mod event_task;
mod file_monitor;
mod result;
mod task;

pub use self::core::{TaskCore, TaskId, TaskState};
pub use event_task::EventTask;
pub use file_monitor::{ComFileMonitor, DEFAULT_STOP_WORDS};
pub use result::TaskResult;
pub use task::{Task, TaskRef};
