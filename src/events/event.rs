//! # Harness events emitted by the waiter, listeners and the driver.
//!
//! [`EventKind`] classifies events in four groups:
//! - **Waiter events**: membership changes and wait outcomes
//! - **Task events**: signal/cancel transitions and command submission
//! - **Listener events**: event-bridge worker lifecycle
//! - **Driver events**: retries, VM lifecycle, reboots
//!
//! The [`Event`] struct carries the metadata (task name, reason, attempt, delays).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use vmharness::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_task("open_session")
//!     .with_reason("invalid_state: session is locked")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(7));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.task.as_deref(), Some("open_session"));
//! assert_eq!(ev.delay_ms, Some(7000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of harness events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `task` (subscriber name) and `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `task` (subscriber name) and `reason`.
    SubscriberOverflow,

    // === Waiter events ===
    /// Task registered in the waiter. Sets `task`.
    TaskAdded,

    /// Task removed from the waiter. Sets `task`.
    TaskRemoved,

    /// `wait_for_any` returned a signalled task. Sets `task`.
    WaitReturned,

    /// `wait_for_any` timed out. Sets `timeout_ms`.
    WaitTimedOut,

    // === Task events ===
    /// Cancellation was requested for a task. Sets `task`.
    TaskCanceled,

    /// A command was handed to the transport. Sets `task`, `timeout_ms`.
    CommandSubmitted,

    /// A command task completed. Sets `task`, `reason` (result).
    CommandCompleted,

    /// The waiter returned a task the current step did not expect.
    ///
    /// Sets `task` (returned task) and `reason` (operation).
    UnexpectedTask,

    // === Listener events ===
    /// An event-bridge listener was registered. Sets `task` (listener name).
    ListenerStarted,

    /// An event-bridge listener finished unregistering. Sets `task`.
    ListenerStopped,

    /// The event source reported a dead interface. Sets `task`, `reason`.
    InterfaceDead,

    // === Driver events ===
    /// A racy operation failed and will be retried.
    ///
    /// Sets `task` (operation), `attempt`, `delay_ms`, `reason`.
    RetryScheduled,

    /// A racy operation ran out of attempts. Sets `task`, `attempt`, `reason`.
    RetriesExhausted,

    /// A VM was launched and its session task registered. Sets `task` (VM name).
    VmStarted,

    /// A VM was powered off or terminated by the driver. Sets `task`.
    VmTerminated,

    /// A reboot was confirmed through a guest UUID change. Sets `reason` (`old -> new`).
    GuestRebooted,
}

impl EventKind {
    /// Short stable label used by log output.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::TaskAdded => "task-added",
            EventKind::TaskRemoved => "task-removed",
            EventKind::WaitReturned => "wait-returned",
            EventKind::WaitTimedOut => "wait-timed-out",
            EventKind::TaskCanceled => "task-canceled",
            EventKind::CommandSubmitted => "command-submitted",
            EventKind::CommandCompleted => "command-completed",
            EventKind::UnexpectedTask => "unexpected-task",
            EventKind::ListenerStarted => "listener-started",
            EventKind::ListenerStopped => "listener-stopped",
            EventKind::InterfaceDead => "interface-dead",
            EventKind::RetryScheduled => "retry-scheduled",
            EventKind::RetriesExhausted => "retries-exhausted",
            EventKind::VmStarted => "vm-started",
            EventKind::VmTerminated => "vm-terminated",
            EventKind::GuestRebooted => "guest-rebooted",
        }
    }
}

/// Harness event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the task/operation/listener, if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, results, overflow details).
    pub reason: Option<Arc<str>>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u32>,
    /// Pause before the next attempt in milliseconds.
    pub delay_ms: Option<u32>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            reason: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task/operation name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a pause (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
