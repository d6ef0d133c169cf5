//! Wake hub shared between a waiter and the tasks registered in it.
//!
//! A signalled task calls [`WakeHub::wake`] while holding its own lock. The call
//! never blocks: it bumps a generation counter and notifies every wait loop that
//! has already enabled its `Notified` future.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Notify, futures::Notified};

#[derive(Debug, Default)]
pub(crate) struct WakeHub {
    notify: Notify,
    generation: AtomicU64,
}

impl WakeHub {
    /// Wakes all current waiters.
    pub(crate) fn wake(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// Number of wakeups so far.
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Future completing on the next [`wake`](Self::wake).
    ///
    /// Callers must `enable()` it before re-checking task state.
    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}
