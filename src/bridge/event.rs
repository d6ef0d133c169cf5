//! Remote event payloads as seen by handlers.
//!
//! The remote API adapter decodes its native event objects into [`RemoteEvent`].
//! Kinds the harness does not act on arrive as [`RemoteEvent::Other`] and are
//! only logged.

use std::fmt;

/// Event kinds a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Wildcard used when the API cannot filter.
    Any,
    MachineStateChanged,
    SessionStateChanged,
    GuestPropertyChanged,
    RuntimeError,
    MousePointerShapeChanged,
    AdditionsStateChanged,
    MediumChanged,
}

impl EventType {
    /// Kinds a VM session listener subscribes to.
    pub const SESSION: [EventType; 4] = [
        EventType::MachineStateChanged,
        EventType::SessionStateChanged,
        EventType::GuestPropertyChanged,
        EventType::RuntimeError,
    ];

    /// Stable name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Any => "Any",
            EventType::MachineStateChanged => "OnMachineStateChanged",
            EventType::SessionStateChanged => "OnSessionStateChanged",
            EventType::GuestPropertyChanged => "OnGuestPropertyChanged",
            EventType::RuntimeError => "OnRuntimeError",
            EventType::MousePointerShapeChanged => "OnMousePointerShapeChanged",
            EventType::AdditionsStateChanged => "OnAdditionsStateChanged",
            EventType::MediumChanged => "OnMediumChanged",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of a VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MachineState {
    PoweredOff,
    Saved,
    Teleported,
    Aborted,
    Running,
    Paused,
    Stuck,
    Teleporting,
    Starting,
    Stopping,
    Saving,
    Restoring,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::PoweredOff => "PoweredOff",
            MachineState::Saved => "Saved",
            MachineState::Teleported => "Teleported",
            MachineState::Aborted => "Aborted",
            MachineState::Running => "Running",
            MachineState::Paused => "Paused",
            MachineState::Stuck => "Stuck",
            MachineState::Teleporting => "Teleporting",
            MachineState::Starting => "Starting",
            MachineState::Stopping => "Stopping",
            MachineState::Saving => "Saving",
            MachineState::Restoring => "Restoring",
        }
    }

    /// True for states in which the VM process is gone.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MachineState::PoweredOff
                | MachineState::Saved
                | MachineState::Teleported
                | MachineState::Aborted
        )
    }
}

/// Lock state of a machine's session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unlocked,
    Locked,
    Spawning,
    Unlocking,
}

impl SessionState {
    /// True while a previous session may still be holding the machine.
    pub fn is_busy(&self) -> bool {
        !matches!(self, SessionState::Unlocked)
    }
}

/// Decoded remote event.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteEvent {
    MachineStateChanged {
        machine_id: String,
        state: MachineState,
    },
    SessionStateChanged {
        machine_id: String,
        state: SessionState,
    },
    GuestPropertyChanged {
        machine_id: String,
        name: String,
        value: String,
        flags: String,
    },
    RuntimeError {
        fatal: bool,
        id: String,
        message: String,
    },
    /// Any kind without a dedicated callback.
    Other(EventType),
}

impl RemoteEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            RemoteEvent::MachineStateChanged { .. } => EventType::MachineStateChanged,
            RemoteEvent::SessionStateChanged { .. } => EventType::SessionStateChanged,
            RemoteEvent::GuestPropertyChanged { .. } => EventType::GuestPropertyChanged,
            RemoteEvent::RuntimeError { .. } => EventType::RuntimeError,
            RemoteEvent::Other(kind) => *kind,
        }
    }
}

/// An event fetched from a source, acknowledged through
/// [`EventSource::event_processed`](super::EventSource::event_processed).
#[derive(Clone, Debug, PartialEq)]
pub struct EventEnvelope {
    /// Source-assigned identity used for the acknowledgement.
    pub seq: u64,
    /// Decoded payload.
    pub event: RemoteEvent,
}

impl EventEnvelope {
    pub fn new(seq: u64, event: RemoteEvent) -> Self {
        Self { seq, event }
    }
}
