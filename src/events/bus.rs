//! # Event bus for broadcasting harness events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. The waiter, the
//! event-bridge listeners, command tasks and the driver publish into it; the driver
//! forwards everything to its [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//! Publishers (many):                 Subscriber (one):
//!   Waiter     ──┐
//!   Listener   ──┼──────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Command    ──┤  (broadcast chan)      (in Driver)
//!   Driver     ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks, so it is safe to call
//!   while holding a task lock.
//! - **Bounded capacity**: slow receivers get `RecvError::Lagged(n)` and skip `n` items.
//! - **No persistence**: events are lost if nobody listens.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for harness events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers; dropped if there are none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes subsequently published events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}
