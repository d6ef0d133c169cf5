//! # Driver: VM lifecycle and the shared wait machinery.
//!
//! [`Driver`] owns the one [`Waiter`] of a test run, the event [`Bus`], the
//! subscriber fan-out, and the list of VMs it started.
//!
//! ```text
//!   Driver::new(cfg, api, process, subscribers)
//!     ├─► Bus (capacity: cfg.bus_capacity)
//!     ├─► Waiter (tick: cfg.wait_tick)
//!     └─► subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!
//!   start_vm(vm)
//!     ├─► launch_vm with retry (start_retry)
//!     ├─► VmSessionTask + SessionEventHandler listener
//!     └─► waiter.add(session), publish VmStarted
//!
//!   terminate_vm(session)
//!     ├─► waiter.remove(session), unregister listener (joined)
//!     ├─► power_off ── Err ──► ProcessControl::terminate(pid) if still alive
//!     └─► close_session, signal session, publish VmTerminated
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{LaunchEnv, ProcessControl, RemoteApi, SessionHandle, VmSessionTask};
use crate::bridge::{EventListener, EventType, SessionEventHandler};
use crate::config::HarnessConfig;
use crate::core::Waiter;
use crate::error::HarnessError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::{Task, TaskRef, TaskResult};

/// Default frontend used to launch VMs.
pub const DEFAULT_SESSION_TYPE: &str = "headless";

/// Orchestration driver for one test run.
pub struct Driver {
    pub(super) cfg: HarnessConfig,
    pub(super) api: Arc<dyn RemoteApi>,
    pub(super) process: Arc<dyn ProcessControl>,
    pub(super) waiter: Arc<Waiter>,
    pub(super) bus: Bus,
    subs: Arc<SubscriberSet>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
    forwarder_stop: CancellationToken,
    sessions: Mutex<Vec<Arc<VmSessionTask>>>,
    session_type: String,
    launch_env: Vec<String>,
}

impl Driver {
    /// Creates a driver and starts forwarding bus events to `subscribers`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        cfg: HarnessConfig,
        api: Arc<dyn RemoteApi>,
        process: Arc<dyn ProcessControl>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let waiter = Arc::new(Waiter::new(cfg.wait_tick, bus.clone()));
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));

        let driver = Self {
            cfg,
            api,
            process,
            waiter,
            bus,
            subs,
            forwarder: Mutex::new(None),
            forwarder_stop: CancellationToken::new(),
            sessions: Mutex::new(Vec::new()),
            session_type: DEFAULT_SESSION_TYPE.to_string(),
            launch_env: Vec::new(),
        };
        driver.subscriber_listener();
        driver
    }

    /// Frontend type passed to `launch_vm`.
    pub fn with_session_type(mut self, session_type: impl Into<String>) -> Self {
        self.session_type = session_type.into();
        self
    }

    /// Extra `KEY=value` entries for every launched VM process.
    pub fn with_launch_env(mut self, vars: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.launch_env = vars.into_iter().map(Into::into).collect();
        self
    }

    /// Subscribes to the bus and forwards events to the subscriber set.
    ///
    /// Once stopped, events already on the bus are still forwarded before the
    /// listener exits.
    fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let stop = self.forwarder_stop.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    r = rx.recv() => match r {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => set.emit(&ev),
                                Err(TryRecvError::Lagged(n)) => {
                                    tracing::warn!(skipped = n, "subscriber listener lagged");
                                }
                                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                            }
                        }
                        break;
                    }
                }
            }
        });
        *self.forwarder.lock() = Some(handle);
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.cfg
    }

    /// The run's waiter.
    pub fn waiter(&self) -> &Arc<Waiter> {
        &self.waiter
    }

    /// The run's event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Registers `task` in the waiter; `false` if it already was.
    pub fn add_task(&self, task: TaskRef) -> bool {
        self.waiter.add(task)
    }

    /// Unregisters `task`; `false` if it was not registered.
    pub fn remove_task(&self, task: &dyn Task) -> bool {
        self.waiter.remove(task)
    }

    /// Waits for any registered task; `None` on timeout.
    pub async fn wait_for_tasks(&self, timeout: Duration) -> Option<TaskRef> {
        self.waiter.wait_for_any(timeout).await
    }

    /// VMs started and not yet terminated.
    pub fn sessions(&self) -> Vec<Arc<VmSessionTask>> {
        self.sessions.lock().clone()
    }

    /// Plain pause, logged.
    pub async fn sleep(&self, duration: Duration) {
        tracing::info!("sleeping {duration:?}...");
        tokio::time::sleep(duration).await;
    }

    /// Launches `vm`, registers its session task and event listener.
    pub async fn start_vm(&self, vm: &str) -> Result<Arc<VmSessionTask>, HarnessError> {
        tracing::info!(vm, session_type = %self.session_type, "start_vm");
        let env = LaunchEnv::build(self.launch_env.clone(), &self.cfg.capabilities);
        let handle = self
            .with_retry("start_vm", vm, &self.cfg.start_retry, || {
                self.api.launch_vm(vm, &self.session_type, &env)
            })
            .await?;

        let session = VmSessionTask::new(handle);
        self.attach_listener(&session).await;

        self.sessions.lock().push(Arc::clone(&session));
        self.waiter.add(session.clone());
        self.bus
            .publish(Event::new(EventKind::VmStarted).with_task(vm.to_string()));
        Ok(session)
    }

    async fn attach_listener(&self, session: &Arc<VmSessionTask>) {
        let source = match self.api.event_source(session.handle()).await {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(vm = session.vm_name(), error = %e, "no event source for session");
                return;
            }
        };
        let handler = Arc::new(SessionEventHandler::new(
            session.vm_name(),
            Arc::downgrade(session),
            Arc::downgrade(&self.waiter),
        ));
        match EventListener::register(
            source,
            handler,
            &EventType::SESSION,
            &self.cfg.capabilities,
            self.cfg.event_fetch_timeout,
            &self.waiter,
            self.bus.clone(),
        )
        .await
        {
            Ok(listener) => session.set_listener(listener),
            Err(e) => {
                tracing::error!(vm = session.vm_name(), error = %e, "registering the session listener failed")
            }
        }
    }

    /// Tears down a VM started by [`start_vm`](Self::start_vm).
    ///
    /// Power-off failures fall back to terminating the VM process when it is
    /// still alive; the error is returned only if that fails too.
    pub async fn terminate_vm(&self, session: &Arc<VmSessionTask>) -> Result<(), HarnessError> {
        let vm = session.vm_name().to_string();
        tracing::info!(vm = %vm, "terminate_vm");

        self.waiter.remove(&**session);
        session.unregister_listener().await;

        let handle: &SessionHandle = session.handle();
        let mut outcome = Ok(());
        if let Err(e) = self.api.power_off(handle).await {
            tracing::warn!(vm = %vm, error = %e, "power off failed");
            outcome = match handle.pid {
                Some(pid) if self.process.is_alive(pid) => {
                    if self.process.terminate(pid) {
                        tracing::info!(vm = %vm, pid, "terminated the VM process");
                        Ok(())
                    } else {
                        Err(HarnessError::from(e))
                    }
                }
                _ => Ok(()),
            };
        }

        if let Err(e) = self.api.close_session(handle).await {
            tracing::debug!(vm = %vm, error = %e, "close_session failed");
        }

        session.signal(TaskResult::Text("PoweredOff".into()));
        self.sessions.lock().retain(|s| !Arc::ptr_eq(s, session));
        self.bus
            .publish(Event::new(EventKind::VmTerminated).with_task(vm));
        outcome
    }

    /// Terminates every VM still running and stops event forwarding.
    pub async fn shutdown(self) {
        for session in self.sessions() {
            if let Err(e) = self.terminate_vm(&session).await {
                tracing::error!(vm = session.vm_name(), error = %e, "terminate_vm failed during shutdown");
            }
        }

        self.forwarder_stop.cancel();
        let forwarder = self.forwarder.lock().take();
        if let Some(handle) = forwarder {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "subscriber listener failed");
                }
            }
        }
        if let Ok(set) = Arc::try_unwrap(self.subs) {
            set.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("waiter", &self.waiter)
            .field("sessions", &self.sessions.lock().len())
            .field("session_type", &self.session_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MockApi, MockProcess};
    use async_trait::async_trait;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, event: &Event) {
            self.seen.lock().push(event.kind);
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_delivers_published_events() {
        let rec = Arc::new(Recorder::default());
        let d = Driver::new(
            HarnessConfig::default(),
            Arc::new(MockApi::default()),
            Arc::new(MockProcess::default()),
            vec![rec.clone() as Arc<dyn Subscribe>],
        );

        d.start_vm("t-vm").await.unwrap();
        for _ in 0..200 {
            d.bus().publish(Event::new(EventKind::CommandSubmitted));
        }
        d.shutdown().await;

        let seen = rec.seen.lock();
        assert_eq!(seen.iter().filter(|k| **k == EventKind::CommandSubmitted).count(), 200);
        assert!(seen.contains(&EventKind::VmStarted));
        assert!(seen.contains(&EventKind::VmTerminated));
    }
}
