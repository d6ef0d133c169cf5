//! # Event-bridge listener.
//!
//! Connects an [`EventSource`] to an [`EventHandler`] in one of two delivery modes:
//!
//! ```text
//! Passive:  worker "PAS-<name>"                    Inline:  Waiter::wait_for_any
//!           loop {                                           └─► pump()
//!             select! { shutdown, get_event(500ms) }             loop get_event(0)
//!             handler.handle_event(ev)                              handler.handle_event(ev)
//!             event_processed(ev) unless shutting down              event_processed(ev)
//!           }
//!           unregister(wait = false)
//! ```
//!
//! ## Rules
//! - After shutdown was requested nothing is dispatched any more.
//! - A dead interface ends delivery for good: logged, never retried.
//! - `unregister` is idempotent. Failures are logged and do not block shutdown.
//! - `unregister(true)` joins the worker, except when called from that worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{EventEnvelope, EventHandler, EventSource, EventType, ListenerId};
use crate::config::{ApiCapabilities, DeliveryMode};
use crate::core::{EventPump, PumpId, Waiter};
use crate::error::RemoteError;
use crate::events::{Bus, Event, EventKind};

tokio::task_local! {
    /// Listener id of the passive worker running the current task.
    static LISTENER_WORKER: ListenerId;
}

/// State shared between the listener handle and its worker or pump.
struct Shared {
    name: Arc<str>,
    id: ListenerId,
    source: Arc<dyn EventSource>,
    handler: Arc<dyn EventHandler>,
    shutdown: CancellationToken,
    unregistered: AtomicBool,
    bus: Bus,
}

impl Shared {
    fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Dispatches and acknowledges one event. Returns `false` if the loop must stop.
    async fn deliver(&self, envelope: EventEnvelope) -> bool {
        tracing::trace!(listener = %self.name, kind = %envelope.event.event_type(), "event");
        self.handler.handle_event(&envelope.event);
        if self.is_shutting_down() {
            return true;
        }
        if let Err(e) = self.source.event_processed(self.id, &envelope).await {
            tracing::error!(listener = %self.name, error = %e, "event_processed failed");
            return false;
        }
        true
    }

    fn interface_died(&self, err: &RemoteError) {
        tracing::info!(listener = %self.name, "interface croaked (ignored): {err}");
        self.bus.publish(
            Event::new(EventKind::InterfaceDead)
                .with_task(Arc::clone(&self.name))
                .with_reason(err.to_string()),
        );
    }

    /// Requests shutdown and drops the registration once.
    async fn unregister(&self) -> bool {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();

        let ok = match self.source.unregister_listener(self.id).await {
            Ok(()) => true,
            Err(e) if e.is_dead_interface() => {
                tracing::info!(
                    listener = %self.name,
                    "unregister_listener failed on {} because of dead interface ({e})",
                    self.id
                );
                false
            }
            Err(e) => {
                tracing::error!(listener = %self.name, error = %e, "unregister_listener failed on {}", self.id);
                false
            }
        };
        self.bus
            .publish(Event::new(EventKind::ListenerStopped).with_task(Arc::clone(&self.name)));
        ok
    }
}

async fn passive_worker(shared: Arc<Shared>, fetch_timeout: Duration) {
    while !shared.is_shutting_down() {
        let fetched = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            r = shared.source.get_event(shared.id, fetch_timeout) => r,
        };
        match fetched {
            Ok(Some(envelope)) => {
                if shared.is_shutting_down() {
                    break;
                }
                if !shared.deliver(envelope).await {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) if e.is_dead_interface() => {
                shared.interface_died(&e);
                break;
            }
            Err(e) => {
                tracing::error!(listener = %shared.name, error = %e, "get_event failed");
                break;
            }
        }
    }
    shared.unregister().await;
}

/// Inline delivery: the waiter drains the source on each tick.
struct InlinePump {
    shared: Arc<Shared>,
}

#[async_trait]
impl EventPump for InlinePump {
    async fn pump(&self) {
        let shared = &self.shared;
        while !shared.is_shutting_down() {
            match shared.source.get_event(shared.id, Duration::ZERO).await {
                Ok(Some(envelope)) => {
                    if !shared.deliver(envelope).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_dead_interface() => {
                    shared.interface_died(&e);
                    shared.unregister().await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(listener = %shared.name, error = %e, "get_event failed");
                    break;
                }
            }
        }
    }

    fn name(&self) -> &str {
        &self.shared.name
    }
}

/// A registered event listener.
///
/// Dropping the handle requests shutdown; a passive worker then exits after its
/// current fetch and unregisters itself.
pub struct EventListener {
    shared: Arc<Shared>,
    mode: DeliveryMode,
    worker: Mutex<Option<JoinHandle<()>>>,
    pump: Mutex<Option<(Weak<Waiter>, PumpId)>>,
}

impl EventListener {
    /// Registers `handler` on `source` and starts delivery.
    ///
    /// Without event filtering support the listener subscribes to
    /// [`EventType::Any`]. Inline listeners are attached to `waiter` as a pump.
    pub async fn register(
        source: Arc<dyn EventSource>,
        handler: Arc<dyn EventHandler>,
        kinds: &[EventType],
        caps: &ApiCapabilities,
        fetch_timeout: Duration,
        waiter: &Arc<Waiter>,
        bus: Bus,
    ) -> Result<Self, RemoteError> {
        let kinds: &[EventType] = if caps.event_filtering && !kinds.is_empty() {
            kinds
        } else {
            &[EventType::Any]
        };
        let mode = caps.delivery;
        let id = source
            .register_listener(kinds, mode == DeliveryMode::Inline)
            .await?;

        let name: Arc<str> = match mode {
            DeliveryMode::Passive => format!("PAS-{}", handler.name()).into(),
            DeliveryMode::Inline => format!("INL-{}", handler.name()).into(),
        };
        let shared = Arc::new(Shared {
            name,
            id,
            source,
            handler,
            shutdown: CancellationToken::new(),
            unregistered: AtomicBool::new(false),
            bus,
        });

        let listener = Self {
            shared: Arc::clone(&shared),
            mode,
            worker: Mutex::new(None),
            pump: Mutex::new(None),
        };

        match mode {
            DeliveryMode::Passive => {
                let worker = LISTENER_WORKER.scope(id, passive_worker(shared, fetch_timeout));
                *listener.worker.lock() = Some(tokio::spawn(worker));
            }
            DeliveryMode::Inline => {
                let pump_id = waiter.attach_pump(Arc::new(InlinePump { shared }));
                *listener.pump.lock() = Some((Arc::downgrade(waiter), pump_id));
            }
        }

        tracing::debug!(listener = %listener.shared.name, id = %id, kinds = ?kinds, "listener registered");
        listener
            .shared
            .bus
            .publish(Event::new(EventKind::ListenerStarted).with_task(Arc::clone(&listener.shared.name)));
        Ok(listener)
    }

    /// Listener name (`PAS-<handler>` or `INL-<handler>`).
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Registration handle at the source.
    pub fn id(&self) -> ListenerId {
        self.shared.id
    }

    /// Delivery mode in use.
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// True once shutdown was requested (by `unregister`, a dead interface, or drop).
    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Stops delivery and drops the registration.
    ///
    /// Returns whether this call unregistered successfully; repeated calls
    /// return `false`. With `wait` the passive worker is joined before
    /// returning, unless the caller is that worker.
    pub async fn unregister(&self, wait: bool) -> bool {
        let ok = self.shared.unregister().await;
        self.detach_pump();

        let own_worker = LISTENER_WORKER
            .try_with(|id| *id == self.shared.id)
            .unwrap_or(false);
        if wait && !own_worker {
            let handle = self.worker.lock().take();
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    tracing::error!(listener = %self.shared.name, error = %e, "listener worker failed");
                }
            }
        }
        ok
    }

    fn detach_pump(&self) {
        let pump = self.pump.lock().take();
        if let Some((waiter, pump_id)) = pump {
            if let Some(waiter) = waiter.upgrade() {
                waiter.detach_pump(pump_id);
            }
        }
    }

    /// True if a passive worker was started and has not been joined yet.
    pub fn has_worker(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
        self.detach_pump();
    }
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("name", &self.shared.name)
            .field("id", &self.shared.id)
            .field("mode", &self.mode)
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{MachineState, RemoteEvent};
    use crate::testkit::MockEventSource;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Default)]
    struct Counting {
        states: AtomicUsize,
    }

    impl EventHandler for Counting {
        fn name(&self) -> &str {
            "t-vm"
        }

        fn on_machine_state_change(&self, _machine_id: &str, _state: MachineState) {
            self.states.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn state_event(state: MachineState) -> RemoteEvent {
        RemoteEvent::MachineStateChanged {
            machine_id: "vm-1".into(),
            state,
        }
    }

    fn waiter() -> Arc<Waiter> {
        Arc::new(Waiter::new(Duration::from_millis(10), Bus::new(64)))
    }

    fn passive() -> ApiCapabilities {
        ApiCapabilities::default().with_delivery(DeliveryMode::Passive)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_passive_dispatches_and_acknowledges() {
        let source = Arc::new(MockEventSource::default());
        let handler = Arc::new(Counting::default());
        let listener = EventListener::register(
            source.clone(),
            handler.clone(),
            &EventType::SESSION,
            &passive(),
            Duration::from_millis(50),
            &waiter(),
            Bus::new(64),
        )
        .await
        .unwrap();
        assert_eq!(listener.name(), "PAS-t-vm");

        source.push(state_event(MachineState::Running));
        source.push(state_event(MachineState::PoweredOff));

        let started = Instant::now();
        while handler.states.load(Ordering::SeqCst) < 2 {
            assert!(started.elapsed() < Duration::from_secs(2), "events not delivered");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(listener.unregister(true).await);
        assert_eq!(source.acknowledged(), 2);
        assert!(!listener.has_worker());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unregister_while_fetching_joins_worker() {
        let source = Arc::new(MockEventSource::default());
        let listener = EventListener::register(
            source.clone(),
            Arc::new(Counting::default()),
            &EventType::SESSION,
            &passive(),
            Duration::from_millis(500),
            &waiter(),
            Bus::new(64),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        assert!(listener.unregister(true).await);
        assert!(started.elapsed() < Duration::from_millis(700));
        assert!(!listener.has_worker());
        assert_eq!(source.live_listeners(), 0);

        // idempotent
        assert!(!listener.unregister(true).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dead_interface_stops_worker() {
        let source = Arc::new(MockEventSource::default());
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let listener = EventListener::register(
            source.clone(),
            Arc::new(Counting::default()),
            &EventType::SESSION,
            &passive(),
            Duration::from_millis(20),
            &waiter(),
            bus,
        )
        .await
        .unwrap();

        source.kill();
        let started = Instant::now();
        while !listener.is_shutting_down() {
            assert!(started.elapsed() < Duration::from_secs(2), "worker kept running");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut saw_dead = false;
        while let Ok(ev) = rx.try_recv() {
            saw_dead |= ev.kind == EventKind::InterfaceDead;
        }
        assert!(saw_dead);

        // already unregistered by the worker; the join still completes
        assert!(!listener.unregister(true).await);
        assert!(!listener.has_worker());
    }

    #[tokio::test]
    async fn test_inline_mode_is_pumped_by_waiter() {
        let source = Arc::new(MockEventSource::default());
        let handler = Arc::new(Counting::default());
        let w = waiter();
        let caps = ApiCapabilities::default().with_delivery(DeliveryMode::Inline);
        let listener = EventListener::register(
            source.clone(),
            handler.clone(),
            &EventType::SESSION,
            &caps,
            Duration::from_millis(500),
            &w,
            Bus::new(64),
        )
        .await
        .unwrap();
        assert!(!listener.has_worker());

        source.push(state_event(MachineState::Paused));
        assert!(w.wait_for_any(Duration::from_millis(30)).await.is_none());
        assert_eq!(handler.states.load(Ordering::SeqCst), 1);
        assert_eq!(source.acknowledged(), 1);

        assert!(listener.unregister(true).await);
        source.push(state_event(MachineState::Running));
        w.wait_for_any(Duration::from_millis(30)).await;
        assert_eq!(handler.states.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_filtering_subscribes_to_any() {
        let source = Arc::new(MockEventSource::default());
        let caps = ApiCapabilities {
            event_filtering: false,
            ..passive()
        };
        let listener = EventListener::register(
            source.clone(),
            Arc::new(Counting::default()),
            &EventType::SESSION,
            &caps,
            Duration::from_millis(20),
            &waiter(),
            Bus::new(64),
        )
        .await
        .unwrap();
        assert_eq!(source.registered_kinds(), vec![EventType::Any]);
        listener.unregister(true).await;
    }
}
