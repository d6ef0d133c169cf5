//! # Event source seam.
//!
//! [`EventSource`] is the part of the remote object API a listener talks to:
//! register, fetch with a timeout, acknowledge, unregister. Implementations
//! report a permanently lost connection as
//! [`RemoteErrorKind::DeadInterface`](crate::RemoteErrorKind::DeadInterface).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::{EventEnvelope, EventType};
use crate::error::RemoteError;

/// Registration handle issued by an [`EventSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Remote event source.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
    /// Registers a listener for `kinds`.
    ///
    /// `active` asks the source to push events (inline delivery); passive
    /// listeners pull with [`get_event`](Self::get_event).
    async fn register_listener(
        &self,
        kinds: &[EventType],
        active: bool,
    ) -> Result<ListenerId, RemoteError>;

    /// Drops a registration.
    async fn unregister_listener(&self, id: ListenerId) -> Result<(), RemoteError>;

    /// Next pending event, waiting at most `timeout` (zero means do not wait).
    async fn get_event(
        &self,
        id: ListenerId,
        timeout: Duration,
    ) -> Result<Option<EventEnvelope>, RemoteError>;

    /// Acknowledges an event returned by [`get_event`](Self::get_event).
    async fn event_processed(
        &self,
        id: ListenerId,
        event: &EventEnvelope,
    ) -> Result<(), RemoteError>;
}
