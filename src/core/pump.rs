//! # Inline event pumping.
//!
//! Event sources delivered in inline mode have no worker of their own. They are
//! attached to the [`Waiter`](crate::Waiter) as an [`EventPump`] and drained on
//! every iteration of `wait_for_any`, before the members are scanned.

use async_trait::async_trait;

/// Something the wait loop drives on each tick.
#[async_trait]
pub trait EventPump: Send + Sync + 'static {
    /// Processes whatever is pending without waiting for more.
    async fn pump(&self);

    /// Name for diagnostics.
    fn name(&self) -> &str {
        "pump"
    }
}
