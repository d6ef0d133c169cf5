//! # TXS connect task.
//!
//! Connecting to the TXS of a freshly booted guest can take minutes. The
//! connection attempt runs as a job and [`ConnectTask`] signals once it is
//! established or has failed, so the driver can wait for it together with the
//! VM session (a VM dying during boot ends the wait immediately).

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Connector, TxsSession};
use crate::events::Bus;
use crate::tasks::{Task, TaskCore, TaskResult};

/// Task resolving to a connected [`TxsSession`].
pub struct ConnectTask {
    core: TaskCore,
    session: Mutex<Option<TxsSession>>,
    abort: CancellationToken,
}

impl ConnectTask {
    /// Starts connecting through `connector`.
    pub fn start(connector: Arc<dyn Connector>, timeout: Duration, bus: Bus) -> Arc<Self> {
        let task = Arc::new(Self {
            core: TaskCore::new("txs:connect"),
            session: Mutex::new(None),
            abort: CancellationToken::new(),
        });

        let job = Arc::clone(&task);
        tokio::spawn(async move {
            tokio::select! {
                r = connector.connect(timeout) => match r {
                    Ok(transport) => {
                        let session = TxsSession::new(transport, bus);
                        let mut state = job.core.lock();
                        if !state.is_signalled() {
                            *job.session.lock() = Some(session);
                            state.signal(TaskResult::Done);
                        }
                    }
                    Err(e) => {
                        job.signal(TaskResult::Failed(e.to_string()));
                    }
                },
                _ = job.abort.cancelled() => {}
            }
        });
        task
    }

    /// Takes the connected session out of the task.
    pub fn take_session(&self) -> Option<TxsSession> {
        let _state = self.core.lock();
        self.session.lock().take()
    }
}

impl Task for ConnectTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn cancel(&self) -> bool {
        self.abort.cancel();
        self.signal(TaskResult::Canceled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockConnector, MockTransport};

    #[tokio::test]
    async fn test_connect_yields_session() {
        let connector = Arc::new(MockConnector::new(Arc::new(MockTransport::default())));
        let task = ConnectTask::start(connector, Duration::from_secs(1), Bus::new(8));
        for _ in 0..100 {
            if task.poll() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(task.result(), Some(TaskResult::Done));
        assert!(task.take_session().is_some());
        assert!(task.take_session().is_none());
    }

    #[tokio::test]
    async fn test_cancel_while_connecting() {
        let connector = Arc::new(MockConnector::unreachable());
        let task = ConnectTask::start(connector, Duration::from_secs(30), Bus::new(8));
        assert!(task.cancel());
        assert!(!task.cancel());
        assert_eq!(task.result(), Some(TaskResult::Canceled));
        assert!(task.take_session().is_none());
    }
}
