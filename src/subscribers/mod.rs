//! # Event subscribers.
//!
//! ```text
//!   Waiter / Listener / Driver ── publish(Event) ──► Bus ──► SubscriberSet
//!                                                               │
//!                                                    ┌──────────┼──────────┐
//!                                                    ▼          ▼          ▼
//!                                                LogWriter   Report     Custom
//! ```
//!
//! Implement [`Subscribe`] to observe the harness without touching the wait loop.

mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
mod log;

pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;

#[cfg(feature = "logging")]
pub use log::LogWriter;
