//! # vmharness
//!
//! **vmharness** is the orchestration core of a VM test driver.
//!
//! It starts virtual machines through a remote object API, talks to the test
//! execution service (TXS) inside the guest, and waits on many asynchronous
//! things at once: guest commands, VM state changes, serial output. Everything
//! that can complete is a [`Task`]; one [`Waiter`] per test run blocks until the
//! first of them signals.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────┐   ┌──────────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │ VmSessionTask│   │ RemoteCommandTask│   │ ConnectTask  │   │ComFileMonitor│
//!   │ (VM lifetime)│   │  (one TXS op)    │   │ (TXS connect)│   │ (polling)    │
//!   └──────┬───────┘   └────────┬─────────┘   └──────┬───────┘   └──────┬───────┘
//!          │ signal             │ signal             │ signal           │ poll_locked
//!          ▼                    ▼                    ▼                  ▼
//! ┌──────────────────────────────────────────────────────────────────────────────┐
//! │  Waiter                                                                      │
//! │  - membership set (add / remove, round-robin scan)                           │
//! │  - wake hub (task signals + membership changes, no missed wakeups)           │
//! │  - event pumps (inline listeners, run on every tick)                         │
//! └───────────────────────────────────┬──────────────────────────────────────────┘
//!                                     ▼
//!                          wait_for_any(timeout) ──► Option<TaskRef>
//!
//!   EventSource ──► EventListener (passive worker | inline pump)
//!                        └─► SessionEventHandler ──► VmSessionTask.signal + Waiter.interrupt
//! ```
//!
//! ### Driver flows
//! ```text
//! Driver::start_vm ──► launch (retried) ──► VmSessionTask + listener ──► waiter
//!        │
//!        ├─► txs_connect ──► [txs_cd_wait] ──► txs_do_task / txs_run_test
//!        │                                          │
//!        │                                          └─► txs_reboot_and_reconnect
//!        │                                               (UUID before != UUID after)
//!        └─► terminate_vm (power off, process kill as fallback)
//!
//! Every step publishes an Event on the Bus:
//!   Bus ──► subscriber_listener ──► SubscriberSet ──► per-subscriber queues
//! ```
//!
//! ## Features
//! | Area              | Description                                                        | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Tasks**         | One cancelable, pollable completion signal for every kind of work. | [`Task`], [`TaskRef`], [`TaskResult`]       |
//! | **Waiting**       | Wait for the first of many tasks with a timeout.                   | [`Waiter`], [`EventPump`]                   |
//! | **Event bridge**  | Turn remote API events into task signals.                          | [`EventListener`], [`EventHandler`]         |
//! | **Guest commands**| TXS requests as tasks, with protocol-level abort.                  | [`TxsSession`], [`RemoteCommandTask`]       |
//! | **Driver**        | VM start/stop, retries, reboot detection, test runs.               | [`Driver`], [`RemoteApi`]                   |
//! | **Subscriber API**| Hook into harness lifecycle events.                                | [`Subscribe`], [`Event`]                    |
//! | **Policies**      | Retry budgets and backoff for racy remote calls.                   | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Errors**        | Typed errors for remote calls, transports and driver steps.        | [`RemoteError`], [`HarnessError`]           |
//! | **Configuration** | Centralized settings and API capabilities.                         | [`HarnessConfig`], [`ApiCapabilities`]      |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vmharness::{Bus, EventTask, Task, TaskResult, Waiter};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let waiter = Waiter::new(Duration::from_millis(10), Bus::new(64));
//!
//!     let ready = EventTask::arc("guest-ready");
//!     let done = EventTask::arc("test-done");
//!     waiter.add(ready.clone());
//!     waiter.add(done.clone());
//!
//!     // nothing signalled yet
//!     assert!(waiter.wait_for_any(Duration::from_millis(20)).await.is_none());
//!
//!     let signaller = Arc::clone(&done);
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(10)).await;
//!         signaller.signal(TaskResult::ExitStatus(0));
//!     });
//!
//!     let first = waiter.wait_for_any(Duration::from_secs(1)).await.unwrap();
//!     assert!(first.is(&*done));
//!     assert_eq!(first.result(), Some(TaskResult::ExitStatus(0)));
//! }
//! ```

mod bridge;
mod config;
mod core;
mod driver;
mod error;
mod events;
mod policies;
mod subscribers;
mod tasks;
mod txs;

#[cfg(test)]
mod testkit;

// ---- Public re-exports ----

pub use bridge::{
    EventEnvelope, EventHandler, EventListener, EventSource, EventType, HOST_MEMORY_LOW,
    ListenerId, MachineState, RemoteEvent, SessionEventHandler, SessionState,
};
pub use config::{ApiCapabilities, ApiVersion, DeliveryMode, HarnessConfig};
pub use self::core::{EventPump, PumpId, Waiter};
pub use driver::{
    DEFAULT_CD_FILE, DEFAULT_SESSION_TYPE, Driver, LaunchEnv, ProcessControl, RemoteApi,
    SessionHandle, SessionInfo, StopOnUnknownTask, TaskHandler, VmSessionTask,
};
pub use error::{HarnessError, RemoteError, RemoteErrorKind, TransportError};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{
    ComFileMonitor, DEFAULT_STOP_WORDS, EventTask, Task, TaskCore, TaskId, TaskRef, TaskResult,
    TaskState,
};
pub use txs::{CommandOp, CommandTransport, ConnectTask, Connector, RemoteCommandTask, TxsSession};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
