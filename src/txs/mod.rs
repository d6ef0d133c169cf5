//! In-guest command execution through the test execution service (TXS).
//!
//! - [`CommandOp`] request descriptors
//! - [`CommandTransport`] / [`Connector`] seams to the opaque wire protocol
//! - [`TxsSession`] shared transport plus submission
//! - [`RemoteCommandTask`] one outstanding request as a task
//! - [`ConnectTask`] connection attempt as a task

mod command;
mod connect;
mod op;
mod session;
mod transport;

pub use command::RemoteCommandTask;
pub use connect::ConnectTask;
pub use op::CommandOp;
pub use session::TxsSession;
pub use transport::{CommandTransport, Connector};
