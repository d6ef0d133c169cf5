//! Orchestration driver.
//!
//! ## Contents
//! - [`Driver`] owns the waiter, the event bus and the started VMs
//! - [`VmSessionTask`] the task that signals when a VM goes away
//! - [`RemoteApi`] / [`ProcessControl`] the external seams
//! - [`TaskHandler`] hook for unexpected tasks during long waits
//!
//! ## Flows
//! ```text
//! start_vm ──► txs_connect ──► [txs_cd_wait] ──► txs_do_task / txs_run_test ...
//!                                  │
//!                                  └─► txs_reboot_and_reconnect (UUID must change)
//! terminate_vm ◄── any failure
//! ```

mod api;
mod handler;
mod retry;
mod session;
mod txs_ops;
mod vm;

pub use api::{LaunchEnv, ProcessControl, RemoteApi, SessionHandle, SessionInfo};
pub use handler::{StopOnUnknownTask, TaskHandler};
pub use session::VmSessionTask;
pub use txs_ops::DEFAULT_CD_FILE;
pub use vm::{DEFAULT_SESSION_TYPE, Driver};
