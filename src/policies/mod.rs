//! Retry policies.
//!
//! ## Contents
//! - [`RetryPolicy`] how often a racy remote call is attempted
//! - [`BackoffPolicy`] how the pause between attempts evolves (first / step / factor / max + jitter)
//! - [`JitterPolicy`] randomization to keep concurrent drivers apart
//!
//! ## Quick wiring
//! ```text
//! HarnessConfig { session_retry: RetryPolicy, start_retry: RetryPolicy, .. }
//!      └─► Driver::open_session / Driver::start_vm:
//!           - attempts bounds the loop
//!           - backoff.next(attempt) bounds the wait for the previous session to close
//! ```
//!
//! ## Defaults
//! - `RetryPolicy::default()` → 10 attempts.
//! - `BackoffPolicy::default()` → first=5s, step=1s, factor=1.0, max=60s, jitter=None.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
