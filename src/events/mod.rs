//! Harness events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Waiter`, `EventListener`, `RemoteCommandTask`, `Driver`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the driver's subscriber listener, which fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
