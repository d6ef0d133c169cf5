//! # Bounded retry for racy remote operations.
//!
//! Opening a session or launching a VM races the asynchronous teardown of a
//! previous instance. [`RetryPolicy`] bounds how often such a call is repeated and
//! how long the driver pauses (while waiting for the old session to go away)
//! between attempts.
//!
//! ```text
//! attempt 0 ──► Err ──► pause backoff.next(0) ──► attempt 1 ──► ... ──► attempt N-1 ──► give up
//! ```

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Attempt budget plus the pause schedule between attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts (`0` is treated as `1`).
    pub attempts: u32,
    /// Pause schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Ten attempts, `5s + 1s × attempt` between them.
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no pauses.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            backoff: BackoffPolicy::constant(Duration::ZERO),
        }
    }

    /// Number of attempts actually made.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Pause after the failed attempt `attempt`, or `None` if it was the last one.
    pub fn pause_after(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts() {
            None
        } else {
            Some(self.backoff.next(attempt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 10);
        assert_eq!(policy.pause_after(0), Some(Duration::from_secs(5)));
        assert_eq!(policy.pause_after(8), Some(Duration::from_secs(13)));
        assert_eq!(policy.pause_after(9), None);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy {
            attempts: 0,
            ..RetryPolicy::once()
        };
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.pause_after(0), None);
    }
}
