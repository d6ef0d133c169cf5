//! # Retry loop for racy session operations.
//!
//! Opening a session or launching a VM right after a previous run races the
//! asynchronous close of that run's direct session. Such calls are repeated
//! under a [`RetryPolicy`], waiting for the old session to go away in between.
//!
//! ```text
//! loop {
//!   ├─► call()
//!   │     ├─ Ok                      ─► return
//!   │     ├─ Err(dead interface)     ─► return Err (never retried)
//!   │     └─ Err(other)
//!   │          ├─ budget exhausted   ─► publish RetriesExhausted, return Err
//!   │          └─ publish RetryScheduled{ attempt, delay }
//!   │             wait_on_direct_session_close(vm, backoff.next(attempt))
//!   └─► attempt += 1
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::{Driver, SessionHandle, SessionInfo};
use crate::error::{HarnessError, RemoteError, RemoteErrorKind};
use crate::events::{Event, EventKind};
use crate::policies::RetryPolicy;

/// Poll interval while waiting for a direct session to close.
const SESSION_POLL: Duration = Duration::from_secs(1);

impl Driver {
    pub(super) async fn with_retry<T, F, Fut>(
        &self,
        op: &str,
        vm: &str,
        policy: &RetryPolicy,
        mut call: F,
    ) -> Result<T, HarnessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::error!(vm, error = %err, "{op}: failed for '{vm}'");
                return Err(err.into());
            }

            let Some(pause) = policy.pause_after(attempt) else {
                let attempts = attempt + 1;
                tracing::error!(vm, error = %err, "{op}: failed for '{vm}', giving up after {attempts} attempts");
                self.bus.publish(
                    Event::new(EventKind::RetriesExhausted)
                        .with_task(op.to_string())
                        .with_attempt(attempts)
                        .with_reason(err.to_string()),
                );
                return Err(HarnessError::RetriesExhausted {
                    op: op.to_string(),
                    attempts,
                    last: err,
                });
            };

            tracing::warn!(vm, error = %err, "{op}: failed for '{vm}' - retrying in up to {pause:?}");
            self.bus.publish(
                Event::new(EventKind::RetryScheduled)
                    .with_task(op.to_string())
                    .with_attempt(attempt + 1)
                    .with_delay(pause)
                    .with_reason(err.to_string()),
            );
            self.wait_on_direct_session_close(vm, pause).await;
            attempt += 1;
        }
    }

    /// Opens an administrative session on `vm`, retrying while a previous
    /// session is still being closed.
    pub async fn open_session(&self, vm: &str) -> Result<SessionHandle, HarnessError> {
        self.with_retry("open_session", vm, &self.cfg.session_retry, || {
            self.api.open_session(vm)
        })
        .await
    }

    /// Waits until the VM process closes its current direct session.
    ///
    /// Returns early once the session is unlocked, changes holder (pid or
    /// name), or `timeout` passes. Failures to query the state end the wait;
    /// access-denied ones silently.
    pub async fn wait_on_direct_session_close(&self, vm: &str, timeout: Duration) {
        let orig = match self.api.session_info(vm).await {
            Ok(info) => info,
            Err(e) => {
                log_session_query_error(vm, &e);
                return;
            }
        };

        let started = Instant::now();
        let mut cur: SessionInfo = orig.clone();
        while cur.pid == orig.pid
            && cur.name == orig.name
            && !cur.name.is_empty()
            && cur.state.is_busy()
            && started.elapsed() < timeout
        {
            let left = timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(SESSION_POLL.min(left)).await;
            cur = match self.api.session_info(vm).await {
                Ok(info) => info,
                Err(e) => {
                    log_session_query_error(vm, &e);
                    break;
                }
            };
        }
    }
}

fn log_session_query_error(vm: &str, err: &RemoteError) {
    if err.kind != RemoteErrorKind::AccessDenied {
        tracing::warn!(vm, error = %err, "querying the session state failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::SessionState;
    use crate::config::HarnessConfig;
    use crate::policies::BackoffPolicy;
    use crate::testkit::{MockApi, MockProcess};
    use std::sync::Arc;

    fn quick_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: BackoffPolicy::constant(Duration::from_millis(10)),
        }
    }

    fn driver(api: Arc<MockApi>, cfg: HarnessConfig) -> Driver {
        Driver::new(cfg, api, Arc::new(MockProcess::default()), Vec::new())
    }

    #[tokio::test]
    async fn test_open_session_retries_until_success() {
        let api = Arc::new(MockApi::default());
        api.fail_open_sessions(3, RemoteErrorKind::InvalidState);
        let cfg = HarnessConfig {
            session_retry: quick_retry(10),
            ..HarnessConfig::default()
        };
        let d = driver(api.clone(), cfg);
        let mut rx = d.bus().subscribe();

        let handle = d.open_session("t-vm").await.unwrap();
        assert_eq!(handle.vm_name, "t-vm");
        assert_eq!(api.open_calls(), 4);

        let mut retries = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::RetryScheduled {
                retries += 1;
            }
        }
        assert_eq!(retries, 3);
    }

    #[tokio::test]
    async fn test_open_session_gives_up() {
        let api = Arc::new(MockApi::default());
        api.fail_open_sessions(100, RemoteErrorKind::InvalidState);
        let cfg = HarnessConfig {
            session_retry: quick_retry(4),
            ..HarnessConfig::default()
        };
        let d = driver(api.clone(), cfg);

        let err = d.open_session("t-vm").await.unwrap_err();
        assert!(matches!(err, HarnessError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(api.open_calls(), 4);
    }

    #[tokio::test]
    async fn test_dead_interface_is_not_retried() {
        let api = Arc::new(MockApi::default());
        api.fail_open_sessions(100, RemoteErrorKind::DeadInterface);
        let d = driver(api.clone(), HarnessConfig::default());

        let err = d.open_session("t-vm").await.unwrap_err();
        assert!(err.is_dead_interface());
        assert_eq!(api.open_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_on_direct_session_close_returns_when_unlocked() {
        let api = Arc::new(MockApi::default());
        api.set_session_info(SessionInfo {
            state: SessionState::Unlocking,
            name: "headless".into(),
            pid: Some(42),
        });
        let d = driver(api.clone(), HarnessConfig::default());

        let api2 = api.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            api2.set_session_info(SessionInfo {
                state: SessionState::Unlocked,
                name: String::new(),
                pid: None,
            });
        });

        let started = Instant::now();
        d.wait_on_direct_session_close("t-vm", Duration::from_secs(10)).await;
        let took = started.elapsed();
        assert!(took >= Duration::from_secs(2), "{took:?}");
        assert!(took <= Duration::from_secs(4), "{took:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_on_direct_session_close_is_bounded() {
        let api = Arc::new(MockApi::default());
        api.set_session_info(SessionInfo {
            state: SessionState::Locked,
            name: "headless".into(),
            pid: Some(42),
        });
        let d = driver(api, HarnessConfig::default());

        let started = Instant::now();
        d.wait_on_direct_session_close("t-vm", Duration::from_secs(5)).await;
        let took = started.elapsed();
        assert!(took >= Duration::from_secs(5), "{took:?}");
        assert!(took < Duration::from_secs(6), "{took:?}");
    }
}
