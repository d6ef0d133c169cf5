//! TXS session: the shared transport plus command submission.

use std::sync::Arc;
use std::time::Duration;

use super::{CommandOp, CommandTransport, RemoteCommandTask};
use crate::events::{Bus, Event, EventKind};

/// Connected TXS session. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct TxsSession {
    transport: Arc<dyn CommandTransport>,
    bus: Bus,
}

impl TxsSession {
    pub fn new(transport: Arc<dyn CommandTransport>, bus: Bus) -> Self {
        Self { transport, bus }
    }

    /// Whether the underlying transport is still usable.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Peer address.
    pub fn hostname(&self) -> String {
        self.transport.hostname()
    }

    /// Starts `op` in the background.
    ///
    /// Returns `None` without submitting anything when the transport is gone.
    pub fn submit(&self, op: CommandOp, timeout: Duration) -> Option<Arc<RemoteCommandTask>> {
        if !self.transport.is_connected() {
            tracing::warn!(op = op.name(), host = %self.hostname(), "submit on disconnected TXS session");
            return None;
        }
        let name = op.name();
        let task = RemoteCommandTask::spawn(op, timeout, Arc::clone(&self.transport), self.bus.clone());
        self.bus.publish(
            Event::new(EventKind::CommandSubmitted)
                .with_task(format!("txs:{name}"))
                .with_timeout(timeout),
        );
        Some(task)
    }
}

impl std::fmt::Debug for TxsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxsSession")
            .field("host", &self.hostname())
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockTransport;

    #[tokio::test]
    async fn test_submit_refused_when_disconnected() {
        let transport = Arc::new(MockTransport::default());
        let session = TxsSession::new(transport.clone(), Bus::new(8));
        assert!(session.submit(CommandOp::Uuid, Duration::from_secs(1)).is_some());

        transport.disconnect();
        assert!(!session.is_connected());
        assert!(session.submit(CommandOp::Uuid, Duration::from_secs(1)).is_none());
    }
}
