//! Event bridge: remote push notifications turned into task signals.
//!
//! - [`RemoteEvent`] and friends: decoded event payloads
//! - [`EventSource`]: the remote registration / fetch / acknowledge seam
//! - [`EventHandler`]: per-kind callbacks plus the dispatcher
//! - [`EventListener`]: inline or passive delivery from a source to a handler
//! - [`SessionEventHandler`]: the handler every started VM gets

mod event;
mod handler;
mod listener;
mod session;
mod source;

pub use event::{EventEnvelope, EventType, MachineState, RemoteEvent, SessionState};
pub use handler::EventHandler;
pub use listener::EventListener;
pub use session::{HOST_MEMORY_LOW, SessionEventHandler};
pub use source::{EventSource, ListenerId};
