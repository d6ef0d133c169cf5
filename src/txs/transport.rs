//! # Command transport seams.
//!
//! The TXS wire protocol is opaque to the harness. A [`CommandTransport`] runs one
//! [`CommandOp`] to completion and can abort the request in flight; a
//! [`Connector`] produces transports.
//!
//! ## Contract
//! - `execute` honours its own `timeout` and reports [`TransportError::Timeout`].
//! - `abort` sends a protocol-level abort for whatever is in flight.
//! - After a disconnect, `is_connected` is `false` and every call fails with
//!   [`TransportError::Disconnected`].

use std::time::Duration;

use async_trait::async_trait;

use super::CommandOp;
use crate::error::TransportError;
use crate::tasks::TaskResult;

/// Connected command channel to one guest.
#[async_trait]
pub trait CommandTransport: Send + Sync + 'static {
    /// Runs `op` and returns its payload.
    async fn execute(&self, op: &CommandOp, timeout: Duration) -> Result<TaskResult, TransportError>;

    /// Aborts the request in flight.
    async fn abort(&self) -> Result<(), TransportError>;

    /// Whether the channel is still usable.
    fn is_connected(&self) -> bool;

    /// Peer address, for log lines.
    fn hostname(&self) -> String {
        "txs".to_string()
    }
}

/// Factory for transports (TCP to the guest, or through NAT port forwarding).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connects, retrying internally until `timeout`.
    async fn connect(&self, timeout: Duration) -> Result<std::sync::Arc<dyn CommandTransport>, TransportError>;
}
