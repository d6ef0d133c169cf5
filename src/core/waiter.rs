//! # Waiter: the pending set and `wait_for_any`.
//!
//! The waiter owns an ordered collection of registered tasks and lets the driver
//! block until any of them signals, with a timeout.
//!
//! ## Architecture
//! ```text
//! add(task) ──► members.lock ──► task.lock ──► attach(hub) ──► hub.wake()
//!
//! wait_for_any(timeout):
//! loop {
//!   ├─► notified = hub.notified(); enable()      (no missed wakeups from here on)
//!   ├─► pump inline event sources
//!   ├─► scan members from the cursor, poll() each
//!   │       └─ signalled ──► cursor = idx + 1, publish WaitReturned, return Some(task)
//!   ├─► deadline passed ──► publish WaitTimedOut, return None
//!   └─► select! { notified, sleep(min(tick, remaining)) }
//! }
//!
//! task.signal(result) ──► task.lock ──► hub.wake() ──► notified completes
//! ```
//!
//! ## Rules
//! - Lock order is membership lock, then task lock. `signal` only takes the task
//!   lock and `wake` never blocks, so no cycle exists.
//! - A task instance is registered at most once; `add` reports duplicates.
//! - The scan starts where the previous successful scan stopped, so several
//!   signalled tasks are handed out over successive calls.
//! - The waiter never cancels or removes anything on timeout.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::{EventPump, WakeHub};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Task, TaskRef};

#[derive(Default)]
struct Members {
    tasks: Vec<TaskRef>,
    cursor: usize,
    pumps: Vec<(PumpId, Arc<dyn EventPump>)>,
    next_pump: u64,
}

/// Handle returned by [`Waiter::attach_pump`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PumpId(u64);

/// Collective wait over heterogeneous tasks.
pub struct Waiter {
    members: Mutex<Members>,
    hub: Arc<WakeHub>,
    bus: Bus,
    tick: Duration,
}

impl Waiter {
    /// Creates an empty waiter re-checking its members at least every `tick`.
    pub fn new(tick: Duration, bus: Bus) -> Self {
        Self {
            members: Mutex::new(Members::default()),
            hub: Arc::new(WakeHub::default()),
            bus,
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    /// Registers `task`. Returns `false` if it is already a member.
    pub fn add(&self, task: TaskRef) -> bool {
        let mut members = self.members.lock();
        if members.tasks.iter().any(|t| t.is(&*task)) {
            return false;
        }
        task.core().lock().attach(&self.hub);
        let label = task.label();
        members.tasks.push(task);
        drop(members);

        self.hub.wake();
        self.bus.publish(Event::new(EventKind::TaskAdded).with_task(label));
        true
    }

    /// Unregisters `task`. Returns `false` if it was not a member.
    pub fn remove(&self, task: &dyn Task) -> bool {
        let mut members = self.members.lock();
        let Some(idx) = members.tasks.iter().position(|t| t.is(task)) else {
            return false;
        };
        let removed = members.tasks.remove(idx);
        removed.core().lock().detach(&self.hub);
        if members.cursor > idx {
            members.cursor -= 1;
        }
        drop(members);

        self.hub.wake();
        self.bus
            .publish(Event::new(EventKind::TaskRemoved).with_task(removed.label()));
        true
    }

    /// Whether `task` is registered.
    pub fn contains(&self, task: &dyn Task) -> bool {
        self.members.lock().tasks.iter().any(|t| t.is(task))
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.members.lock().tasks.len()
    }

    /// True if no task is registered.
    pub fn is_empty(&self) -> bool {
        self.members.lock().tasks.is_empty()
    }

    /// Snapshot of the registered tasks, in registration order.
    pub fn tasks(&self) -> Vec<TaskRef> {
        self.members.lock().tasks.clone()
    }

    /// Wakes a blocked `wait_for_any` so it re-checks its members.
    pub fn interrupt(&self) {
        self.hub.wake();
    }

    /// Attaches an inline event source drained by the wait loop.
    pub fn attach_pump(&self, pump: Arc<dyn EventPump>) -> PumpId {
        let mut members = self.members.lock();
        members.next_pump += 1;
        let id = PumpId(members.next_pump);
        members.pumps.push((id, pump));
        drop(members);
        self.hub.wake();
        id
    }

    /// Detaches a previously attached event source.
    pub fn detach_pump(&self, id: PumpId) -> bool {
        let mut members = self.members.lock();
        let before = members.pumps.len();
        members.pumps.retain(|(p, _)| *p != id);
        before != members.pumps.len()
    }

    /// Waits until any registered task is signalled or `timeout` elapses.
    ///
    /// Returns the signalled task (it stays registered) or `None` on timeout.
    /// A zero timeout checks once and returns immediately.
    pub async fn wait_for_any(&self, timeout: Duration) -> Option<TaskRef> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let notified = self.hub.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.run_pumps().await;

            if let Some(task) = self.scan() {
                self.bus
                    .publish(Event::new(EventKind::WaitReturned).with_task(task.label()));
                return Some(task);
            }

            let nap = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.bus
                            .publish(Event::new(EventKind::WaitTimedOut).with_timeout(timeout));
                        return None;
                    }
                    self.tick.min(deadline - now)
                }
                None => self.tick,
            };

            tokio::select! {
                _ = &mut notified => {
                    tracing::trace!(generation = self.hub.generation(), "waiter woken");
                }
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }

    async fn run_pumps(&self) {
        let pumps: Vec<_> = self
            .members
            .lock()
            .pumps
            .iter()
            .map(|(_, p)| Arc::clone(p))
            .collect();
        for pump in pumps {
            pump.pump().await;
        }
    }

    fn scan(&self) -> Option<TaskRef> {
        let mut members = self.members.lock();
        let n = members.tasks.len();
        if n == 0 {
            return None;
        }
        let start = members.cursor % n;
        for off in 0..n {
            let idx = (start + off) % n;
            if members.tasks[idx].poll() {
                members.cursor = idx + 1;
                return Some(Arc::clone(&members.tasks[idx]));
            }
        }
        None
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let members = self.members.get_mut();
        for task in members.tasks.drain(..) {
            task.core().lock().detach(&self.hub);
        }
    }
}

impl std::fmt::Debug for Waiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members = self.members.lock();
        f.debug_struct("Waiter")
            .field("tasks", &members.tasks.len())
            .field("pumps", &members.pumps.len())
            .field("tick", &self.tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{EventTask, TaskResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant as StdInstant;

    fn waiter() -> Waiter {
        Waiter::new(Duration::from_millis(20), Bus::new(64))
    }

    #[tokio::test]
    async fn test_timeout_without_signal() {
        let w = waiter();
        w.add(EventTask::arc("idle"));

        let started = StdInstant::now();
        assert!(w.wait_for_any(Duration::from_millis(200)).await.is_none());
        let took = started.elapsed();
        assert!(took >= Duration::from_millis(200), "{took:?}");
        assert!(took < Duration::from_millis(400), "{took:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_signal_from_other_thread() {
        let w = waiter();
        let task = EventTask::arc("remote");
        w.add(task.clone());

        let signaller = task.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            signaller.signal(TaskResult::ExitStatus(7));
        });

        let started = StdInstant::now();
        let got = w
            .wait_for_any(Duration::from_secs(5))
            .await
            .expect("signalled task");
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(got.is(&*task));
        assert_eq!(got.result(), Some(TaskResult::ExitStatus(7)));
    }

    #[tokio::test]
    async fn test_signalled_before_wait_is_observed() {
        let w = waiter();
        let task = EventTask::arc("early");
        task.signal(TaskResult::Done);
        w.add(task.clone());

        let got = w.wait_for_any(Duration::ZERO).await.expect("already signalled");
        assert!(got.is(&*task));
    }

    #[tokio::test]
    async fn test_zero_timeout_returns_immediately() {
        let w = waiter();
        w.add(EventTask::arc("pending"));
        let started = StdInstant::now();
        assert!(w.wait_for_any(Duration::ZERO).await.is_none());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_successive_waits_return_each_signalled_task() {
        let w = waiter();
        let a = EventTask::arc("a");
        let b = EventTask::arc("b");
        w.add(a.clone());
        w.add(b.clone());
        a.signal(TaskResult::Done);
        b.signal(TaskResult::Done);

        let first = w.wait_for_any(Duration::ZERO).await.expect("first");
        let second = w.wait_for_any(Duration::ZERO).await.expect("second");
        assert!(!first.is(&*second));
        assert!(first.is(&*a) || first.is(&*b));
        assert!(second.is(&*a) || second.is(&*b));
    }

    #[tokio::test]
    async fn test_membership_is_added_minus_removed() {
        let w = waiter();
        let a: TaskRef = EventTask::arc("a");
        let b: TaskRef = EventTask::arc("b");

        assert!(w.add(a.clone()));
        assert!(!w.add(a.clone()));
        assert!(w.add(b.clone()));
        assert_eq!(w.len(), 2);

        assert!(w.remove(&*a));
        assert!(!w.remove(&*a));
        assert!(!w.contains(&*a));
        assert!(w.contains(&*b));
        assert_eq!(w.len(), 1);
    }

    #[tokio::test]
    async fn test_removed_task_is_not_returned() {
        let w = waiter();
        let a = EventTask::arc("a");
        w.add(a.clone());
        w.remove(&*a);
        a.signal(TaskResult::Done);
        assert!(w.wait_for_any(Duration::from_millis(30)).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_add_during_wait_is_picked_up() {
        let w = Arc::new(waiter());
        let late = EventTask::arc("late");
        late.signal(TaskResult::Flag(true));

        let w2 = w.clone();
        let late2 = late.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            w2.add(late2);
        });

        let got = w
            .wait_for_any(Duration::from_secs(2))
            .await
            .expect("task added mid-wait");
        assert!(got.is(&*late));
    }

    struct CountingPump(AtomicUsize);

    #[async_trait::async_trait]
    impl EventPump for CountingPump {
        async fn pump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_pumps_run_on_every_tick() {
        let w = waiter();
        let pump = Arc::new(CountingPump(AtomicUsize::new(0)));
        let id = w.attach_pump(pump.clone());

        assert!(w.wait_for_any(Duration::from_millis(100)).await.is_none());
        let seen = pump.0.load(Ordering::SeqCst);
        assert!(seen >= 3, "{seen}");

        assert!(w.detach_pump(id));
        assert!(!w.detach_pump(id));
        w.wait_for_any(Duration::from_millis(30)).await;
        assert_eq!(pump.0.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_events_published() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let w = Waiter::new(Duration::from_millis(10), bus);
        let t = EventTask::arc("t");
        w.add(t.clone());
        w.remove(&*t);

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::TaskAdded);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::TaskRemoved);
    }
}
