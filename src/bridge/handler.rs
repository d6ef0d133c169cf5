//! # Event handlers.
//!
//! [`EventHandler`] has one callback per event kind the harness understands.
//! Every callback has a no-op default, so a handler overrides only what it
//! needs. [`EventHandler::handle_event`] is the dispatcher used by listeners.
//!
//! Callbacks run on the listener's delivery path (the passive worker or the
//! wait loop's pump). They must not block; signalling a task or interrupting
//! the waiter is the expected amount of work.

use super::{EventType, MachineState, RemoteEvent, SessionState};

/// Receiver of decoded remote events.
pub trait EventHandler: Send + Sync + 'static {
    /// Name used in log lines (typically the VM name).
    fn name(&self) -> &str;

    fn on_machine_state_change(&self, _machine_id: &str, _state: MachineState) {}

    fn on_session_state_change(&self, _machine_id: &str, _state: SessionState) {}

    fn on_guest_property_change(&self, _machine_id: &str, _name: &str, _value: &str, _flags: &str) {}

    fn on_runtime_error(&self, _fatal: bool, _id: &str, _message: &str) {}

    /// Kinds without a dedicated callback.
    fn on_other(&self, kind: EventType) {
        if kind != EventType::MousePointerShapeChanged {
            tracing::trace!(handler = self.name(), "{kind}");
        }
    }

    /// Routes `event` to its callback.
    fn handle_event(&self, event: &RemoteEvent) {
        match event {
            RemoteEvent::MachineStateChanged { machine_id, state } => {
                self.on_machine_state_change(machine_id, *state)
            }
            RemoteEvent::SessionStateChanged { machine_id, state } => {
                self.on_session_state_change(machine_id, *state)
            }
            RemoteEvent::GuestPropertyChanged {
                machine_id,
                name,
                value,
                flags,
            } => self.on_guest_property_change(machine_id, name, value, flags),
            RemoteEvent::RuntimeError { fatal, id, message } => {
                self.on_runtime_error(*fatal, id, message)
            }
            RemoteEvent::Other(kind) => self.on_other(*kind),
        }
    }
}
