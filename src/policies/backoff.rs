//! # Backoff policy for racy remote operations.
//!
//! [`BackoffPolicy`] controls how the pause between two attempts grows.
//! It is parameterized by:
//! - [`BackoffPolicy::first`] the pause after the first failed attempt;
//! - [`BackoffPolicy::step`] a linear increment added per attempt;
//! - [`BackoffPolicy::factor`] a multiplicative growth factor;
//! - [`BackoffPolicy::max`] the cap.
//!
//! The pause for attempt `n` (0-indexed) is `first × factor^n + step × n`, clamped to
//! `max`, then jitter is applied. The base is derived from the attempt number only,
//! so a jittered value never feeds into later attempts.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use vmharness::{BackoffPolicy, JitterPolicy};
//!
//! // The session-open race: 5s, 6s, 7s, ...
//! let linear = BackoffPolicy::linear(Duration::from_secs(5), Duration::from_secs(1));
//! assert_eq!(linear.next(0), Duration::from_secs(5));
//! assert_eq!(linear.next(3), Duration::from_secs(8));
//!
//! let exp = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     step: Duration::ZERO,
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(exp.next(1), Duration::from_millis(200));
//! assert_eq!(exp.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay schedule between attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Pause after the first failed attempt.
    pub first: Duration,
    /// Linear increment added for every further attempt.
    pub step: Duration,
    /// Cap for any computed pause.
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` keeps the exponential part constant).
    pub factor: f64,
    /// Randomization applied on top of the computed pause.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns the session-open race schedule: `first = 5s`, `step = 1s`,
    /// `factor = 1.0`, `max = 60s`, no jitter.
    fn default() -> Self {
        Self::linear(Duration::from_secs(5), Duration::from_secs(1))
    }
}

impl BackoffPolicy {
    /// Linear schedule `first + step × attempt`, capped at 60s.
    pub fn linear(first: Duration, step: Duration) -> Self {
        Self {
            first,
            step,
            max: Duration::from_secs(60),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Constant pause, mostly useful for tests.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            step: Duration::ZERO,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the pause following attempt `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp)
            + self.step.as_secs_f64() * f64::from(attempt);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}
