//! Wait core: the pending set and its wake machinery.
//!
//! - [`waiter`]: pending set with `add`/`remove`/`wait_for_any`;
//! - [`pump`]: inline event sources driven by the wait loop;
//! - `hub`: wake target shared by the waiter and its member tasks.

mod hub;
mod pump;
mod waiter;

pub(crate) use hub::WakeHub;
pub use pump::EventPump;
pub use waiter::{PumpId, Waiter};
