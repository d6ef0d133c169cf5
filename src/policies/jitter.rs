//! # Jitter applied to retry pauses.
//!
//! Several drivers sharing a host tend to hit the same racy teardown windows at
//! the same moment. [`JitterPolicy`] spreads their retries:
//!
//! - [`JitterPolicy::None`] exact pause;
//! - [`JitterPolicy::Full`] uniform in `[0, pause]`;
//! - [`JitterPolicy::Equal`] `pause/2 + uniform[0, pause/2]`;
//! - [`JitterPolicy::Decorrelated`] uniform in `[floor, prev × 3]`, capped.

use rand::Rng;
use std::time::Duration;

/// Randomization strategy for retry pauses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the computed pause unchanged.
    #[default]
    None,
    /// Uniformly random pause in `[0, pause]`.
    Full,
    /// Half the pause plus a random share of the other half.
    Equal,
    /// Random pause between a floor and three times the base, capped at the maximum.
    ///
    /// Needs the extra context passed to [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies the stateless variants; `Decorrelated` passes `pause` through.
    pub fn apply(&self, pause: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => pause,
            JitterPolicy::Full => uniform_ms(0, millis(pause)),
            JitterPolicy::Equal => {
                let half = millis(pause) / 2;
                Duration::from_millis(half) + uniform_ms(0, half)
            }
        }
    }

    /// Decorrelated jitter: uniform in `[floor, min(base × 3, max)]`.
    ///
    /// Other variants fall back to [`apply`](Self::apply) on `base`.
    pub fn apply_decorrelated(&self, floor: Duration, base: Duration, max: Duration) -> Duration {
        if *self != JitterPolicy::Decorrelated {
            return self.apply(base);
        }
        let lo = millis(floor);
        let hi = millis(base).saturating_mul(3).min(millis(max)).max(lo);
        uniform_ms(lo, hi)
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

fn uniform_ms(lo: u64, hi: u64) -> Duration {
    if lo >= hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_jitter_bounds() {
        for _ in 0..100 {
            let d = JitterPolicy::Full.apply(Duration::from_millis(300));
            assert!(d <= Duration::from_millis(300));
        }
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_decorrelated_respects_floor_and_cap() {
        for _ in 0..100 {
            let d = JitterPolicy::Decorrelated.apply_decorrelated(
                Duration::from_millis(100),
                Duration::from_secs(5),
                Duration::from_secs(8),
            );
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_secs(8));
        }
    }
}
