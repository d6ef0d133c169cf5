//! Deterministic stand-ins for the external seams, used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::bridge::{EventEnvelope, EventSource, EventType, ListenerId, RemoteEvent, SessionState};
use crate::driver::{LaunchEnv, ProcessControl, RemoteApi, SessionHandle, SessionInfo};
use crate::error::{RemoteError, RemoteErrorKind, TransportError};
use crate::tasks::TaskResult;
use crate::txs::{CommandOp, CommandTransport, Connector};

/// In-memory event queue with fetch-with-timeout semantics.
#[derive(Default)]
pub(crate) struct MockEventSource {
    queue: Mutex<VecDeque<EventEnvelope>>,
    arrived: Notify,
    next_seq: AtomicU64,
    next_id: AtomicU64,
    dead: AtomicBool,
    acked: AtomicUsize,
    live: AtomicUsize,
    kinds: Mutex<Vec<EventType>>,
}

impl MockEventSource {
    pub(crate) fn push(&self, event: RemoteEvent) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().push_back(EventEnvelope::new(seq, event));
        self.arrived.notify_one();
    }

    /// Every further call fails with a dead interface.
    pub(crate) fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
        self.arrived.notify_one();
    }

    pub(crate) fn acknowledged(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    pub(crate) fn live_listeners(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Kinds passed to the latest registration.
    pub(crate) fn registered_kinds(&self) -> Vec<EventType> {
        self.kinds.lock().clone()
    }

    fn check_alive(&self) -> Result<(), RemoteError> {
        if self.dead.load(Ordering::SeqCst) {
            Err(RemoteError::dead("event source gone"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn register_listener(
        &self,
        kinds: &[EventType],
        _active: bool,
    ) -> Result<ListenerId, RemoteError> {
        self.check_alive()?;
        *self.kinds.lock() = kinds.to_vec();
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1))
    }

    async fn unregister_listener(&self, _id: ListenerId) -> Result<(), RemoteError> {
        self.check_alive()?;
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_event(
        &self,
        _id: ListenerId,
        timeout: Duration,
    ) -> Result<Option<EventEnvelope>, RemoteError> {
        self.check_alive()?;
        let ready = self.queue.lock().pop_front();
        if ready.is_some() || timeout.is_zero() {
            return Ok(ready);
        }
        let _ = tokio::time::timeout(timeout, self.arrived.notified()).await;
        self.check_alive()?;
        Ok(self.queue.lock().pop_front())
    }

    async fn event_processed(
        &self,
        _id: ListenerId,
        _event: &EventEnvelope,
    ) -> Result<(), RemoteError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Behaviour {
    Reply(TaskResult),
    Fail(String),
    Hang,
    ReplyThenDisconnect(TaskResult),
}

/// Scripted TXS transport.
///
/// Each op name has a queue of behaviours; the last one repeats. Unscripted
/// ops reply [`TaskResult::Done`].
#[derive(Default)]
pub(crate) struct MockTransport {
    script: Mutex<HashMap<String, VecDeque<Behaviour>>>,
    calls: Mutex<HashMap<String, usize>>,
    disconnected: AtomicBool,
    aborts: AtomicUsize,
}

impl MockTransport {
    fn script(&self, op: &str, behaviour: Behaviour) {
        self.script
            .lock()
            .entry(op.to_string())
            .or_default()
            .push_back(behaviour);
    }

    pub(crate) fn reply(&self, op: &str, result: TaskResult) {
        self.script(op, Behaviour::Reply(result));
    }

    pub(crate) fn fail(&self, op: &str, reason: &str) {
        self.script(op, Behaviour::Fail(reason.to_string()));
    }

    /// The op never completes on its own.
    pub(crate) fn hang(&self, op: &str) {
        self.script(op, Behaviour::Hang);
    }

    pub(crate) fn reply_then_disconnect(&self, op: &str, result: TaskResult) {
        self.script(op, Behaviour::ReplyThenDisconnect(result));
    }

    pub(crate) fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub(crate) fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    fn next(&self, op: &str) -> Behaviour {
        let mut script = self.script.lock();
        let next = match script.get_mut(op) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        next.unwrap_or(Behaviour::Reply(TaskResult::Done))
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn execute(&self, op: &CommandOp, _timeout: Duration) -> Result<TaskResult, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        *self.calls.lock().entry(op.name().to_string()).or_default() += 1;

        match self.next(op.name()) {
            Behaviour::Reply(result) => Ok(result),
            Behaviour::Fail(reason) => Err(TransportError::Failed { reason }),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::ReplyThenDisconnect(result) => {
                self.disconnect();
                Ok(result)
            }
        }
    }

    async fn abort(&self) -> Result<(), TransportError> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    fn hostname(&self) -> String {
        "mock-txs".to_string()
    }
}

/// Hands out transports in order; the last one is reused.
pub(crate) struct MockConnector {
    transports: Mutex<VecDeque<Arc<MockTransport>>>,
}

impl MockConnector {
    pub(crate) fn new(transport: Arc<MockTransport>) -> Self {
        Self::sequence(vec![transport])
    }

    pub(crate) fn sequence(transports: Vec<Arc<MockTransport>>) -> Self {
        Self {
            transports: Mutex::new(transports.into()),
        }
    }

    /// Every attempt runs into its timeout.
    pub(crate) fn unreachable() -> Self {
        Self::sequence(Vec::new())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, timeout: Duration) -> Result<Arc<dyn CommandTransport>, TransportError> {
        let next = {
            let mut transports = self.transports.lock();
            if transports.len() > 1 {
                transports.pop_front()
            } else {
                transports.front().cloned()
            }
        };
        match next {
            Some(transport) => Ok(transport),
            None => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Connect {
                    reason: "host unreachable".into(),
                })
            }
        }
    }
}

/// Remote API with scripted session-open failures.
pub(crate) struct MockApi {
    info: Mutex<SessionInfo>,
    open_failures: Mutex<(u32, RemoteErrorKind)>,
    open_calls: AtomicU32,
    power_off_fails: AtomicBool,
    power_offs: AtomicUsize,
    connector: Mutex<Arc<MockConnector>>,
    source: Arc<MockEventSource>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            info: Mutex::new(SessionInfo {
                state: SessionState::Unlocked,
                name: String::new(),
                pid: None,
            }),
            open_failures: Mutex::new((0, RemoteErrorKind::Failed)),
            open_calls: AtomicU32::new(0),
            power_off_fails: AtomicBool::new(false),
            power_offs: AtomicUsize::new(0),
            connector: Mutex::new(Arc::new(MockConnector::new(Arc::new(MockTransport::default())))),
            source: Arc::new(MockEventSource::default()),
        }
    }
}

impl MockApi {
    /// The next `n` session opens fail with `kind`.
    pub(crate) fn fail_open_sessions(&self, n: u32, kind: RemoteErrorKind) {
        *self.open_failures.lock() = (n, kind);
    }

    pub(crate) fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_session_info(&self, info: SessionInfo) {
        *self.info.lock() = info;
    }

    pub(crate) fn fail_power_off(&self) {
        self.power_off_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn power_offs(&self) -> usize {
        self.power_offs.load(Ordering::SeqCst)
    }

    pub(crate) fn set_connector(&self, connector: MockConnector) {
        *self.connector.lock() = Arc::new(connector);
    }

    /// Event source shared by every session.
    pub(crate) fn source(&self) -> Arc<MockEventSource> {
        Arc::clone(&self.source)
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn session_info(&self, _vm: &str) -> Result<SessionInfo, RemoteError> {
        Ok(self.info.lock().clone())
    }

    async fn open_session(&self, vm: &str) -> Result<SessionHandle, RemoteError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let mut failures = self.open_failures.lock();
        if failures.0 > 0 {
            failures.0 -= 1;
            return Err(RemoteError::new(failures.1, "session is busy"));
        }
        Ok(SessionHandle {
            machine_id: format!("{vm}-uuid"),
            vm_name: vm.to_string(),
            pid: None,
        })
    }

    async fn launch_vm(
        &self,
        vm: &str,
        _session_type: &str,
        _env: &LaunchEnv,
    ) -> Result<SessionHandle, RemoteError> {
        Ok(SessionHandle {
            machine_id: format!("{vm}-uuid"),
            vm_name: vm.to_string(),
            pid: Some(4242),
        })
    }

    async fn event_source(&self, _session: &SessionHandle) -> Result<Arc<dyn EventSource>, RemoteError> {
        Ok(self.source())
    }

    async fn power_off(&self, _session: &SessionHandle) -> Result<(), RemoteError> {
        self.power_offs.fetch_add(1, Ordering::SeqCst);
        if self.power_off_fails.load(Ordering::SeqCst) {
            return Err(RemoteError::failed("power down failed"));
        }
        Ok(())
    }

    async fn close_session(&self, _session: &SessionHandle) -> Result<(), RemoteError> {
        Ok(())
    }

    async fn txs_connector(
        &self,
        _session: &SessionHandle,
        _nat: bool,
    ) -> Result<Arc<dyn Connector>, RemoteError> {
        let connector: Arc<dyn Connector> = self.connector.lock().clone();
        Ok(connector)
    }
}

/// Host processes that die on the first terminate request.
pub(crate) struct MockProcess {
    alive: AtomicBool,
    terminated: Mutex<Vec<u32>>,
}

impl Default for MockProcess {
    fn default() -> Self {
        Self {
            alive: AtomicBool::new(true),
            terminated: Mutex::new(Vec::new()),
        }
    }
}

impl MockProcess {
    pub(crate) fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().clone()
    }
}

impl ProcessControl for MockProcess {
    fn is_alive(&self, _pid: u32) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn terminate(&self, pid: u32) -> bool {
        self.terminated.lock().push(pid);
        self.alive.store(false, Ordering::SeqCst);
        true
    }

    fn interrupt(&self, _pid: u32) -> bool {
        true
    }
}
