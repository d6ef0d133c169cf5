//! # Harness configuration.
//!
//! Provides [`HarnessConfig`], the centralized settings for a [`Driver`](crate::Driver),
//! and [`ApiCapabilities`], the explicit feature flags derived once from the
//! remote API version.
//!
//! Config is used in two ways:
//! 1. **Driver creation**: `Driver::new(config, api, process, subscribers)`
//! 2. **Per-call defaults**: command timeouts, retry budgets and settle delays
//!
//! ## Sentinel values
//! - `default_command_timeout = 0s` → commands wait forever (`None` from the accessor)
//! - `nat_settle = 0s` → no settle pause after a reboot behind NAT

use std::fmt;
use std::time::Duration;

use crate::policies::{BackoffPolicy, RetryPolicy};

/// How an event listener receives its events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The wait loop pumps the source on every tick and dispatches inline.
    Inline,
    /// A dedicated worker fetches with a short timeout and dispatches.
    Passive,
}

/// Remote API version as `major.minor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl ApiVersion {
    /// Creates a version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses `"6.1"` / `"6.1.18"` / `"7.0.0_BETA1"`; extra components are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(|c: char| c == '.' || c == '_');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        Some(Self { major, minor })
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Behaviour switches that depend on the remote API version.
///
/// Resolved once by [`ApiCapabilities::resolve`]; code never compares versions
/// itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiCapabilities {
    /// Listeners may subscribe to a subset of event kinds.
    pub event_filtering: bool,
    /// The launch environment is passed as a list instead of a newline-joined string.
    pub launch_env_as_list: bool,
    /// Delivery mode used for new listeners.
    pub delivery: DeliveryMode,
}

impl ApiCapabilities {
    /// Maps an API version to its capabilities.
    ///
    /// - event filtering exists from 4.0 on;
    /// - list-form launch environments from 6.1 on;
    /// - delivery defaults to [`DeliveryMode::Passive`].
    pub fn resolve(version: ApiVersion) -> Self {
        Self {
            event_filtering: version >= ApiVersion::new(4, 0),
            launch_env_as_list: version >= ApiVersion::new(6, 1),
            delivery: DeliveryMode::Passive,
        }
    }

    /// Same flags with a different delivery mode.
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }
}

impl Default for ApiCapabilities {
    fn default() -> Self {
        Self::resolve(ApiVersion::new(7, 0))
    }
}

/// Global configuration for a driver.
///
/// ## Field semantics
/// - `wait_tick`: upper bound between two re-checks inside `wait_for_any`
/// - `event_fetch_timeout`: per-iteration fetch timeout of passive listeners
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `default_command_timeout`: timeout of the `txs_*` wrappers (`0s` = none)
/// - `session_retry` / `start_retry`: attempt budgets for the two racy operations
/// - `nat_settle`: pause before reconnecting to a rebooted guest behind NAT
/// - `cd_wait_interval`: pause between two CD-ROM probes
/// - `capabilities`: resolved API capabilities
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Re-check interval of the wait loop.
    pub wait_tick: Duration,

    /// Fetch timeout of one passive listener iteration.
    ///
    /// Bounds how long `unregister` waits for the worker to notice the shutdown.
    pub event_fetch_timeout: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Timeout used by the convenience wrappers.
    pub default_command_timeout: Duration,

    /// Retry budget for opening a session.
    pub session_retry: RetryPolicy,

    /// Retry budget for launching the VM process.
    pub start_retry: RetryPolicy,

    /// Pause after a reboot before reconnecting through NAT port forwarding.
    pub nat_settle: Duration,

    /// Pause between two CD-ROM probes.
    pub cd_wait_interval: Duration,

    /// Remote API capabilities.
    pub capabilities: ApiCapabilities,
}

impl HarnessConfig {
    /// Config with capabilities resolved for `version`.
    pub fn for_version(version: ApiVersion) -> Self {
        Self {
            capabilities: ApiCapabilities::resolve(version),
            ..Self::default()
        }
    }

    /// Returns the wrapper command timeout as an `Option`.
    #[inline]
    pub fn command_timeout(&self) -> Option<Duration> {
        if self.default_command_timeout == Duration::ZERO {
            None
        } else {
            Some(self.default_command_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for HarnessConfig {
    /// Default configuration:
    ///
    /// - `wait_tick = 100ms`
    /// - `event_fetch_timeout = 500ms`
    /// - `bus_capacity = 1024`
    /// - `default_command_timeout = 30s`
    /// - `session_retry = start_retry = 10 attempts, 5s + 1s per attempt`
    /// - `nat_settle = 22s`
    /// - `cd_wait_interval = 1s`
    fn default() -> Self {
        let retry = RetryPolicy {
            attempts: 10,
            backoff: BackoffPolicy::linear(Duration::from_secs(5), Duration::from_secs(1)),
        };
        Self {
            wait_tick: Duration::from_millis(100),
            event_fetch_timeout: Duration::from_millis(500),
            bus_capacity: 1024,
            default_command_timeout: Duration::from_secs(30),
            session_retry: retry,
            start_retry: retry,
            nat_settle: Duration::from_secs(22),
            cd_wait_interval: Duration::from_secs(1),
            capabilities: ApiCapabilities::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        assert_eq!(ApiVersion::parse("6.1"), Some(ApiVersion::new(6, 1)));
        assert_eq!(ApiVersion::parse("7.0.12"), Some(ApiVersion::new(7, 0)));
        assert_eq!(ApiVersion::parse("5_BETA"), None);
        assert_eq!(ApiVersion::parse("5"), Some(ApiVersion::new(5, 0)));
        assert_eq!(ApiVersion::parse("x.1"), None);
    }

    #[test]
    fn test_capabilities_follow_version() {
        let old = ApiCapabilities::resolve(ApiVersion::new(3, 2));
        assert!(!old.event_filtering);
        assert!(!old.launch_env_as_list);

        let mid = ApiCapabilities::resolve(ApiVersion::new(6, 0));
        assert!(mid.event_filtering);
        assert!(!mid.launch_env_as_list);

        let new = ApiCapabilities::resolve(ApiVersion::new(6, 1));
        assert!(new.launch_env_as_list);
        assert_eq!(new.delivery, DeliveryMode::Passive);
    }

    #[test]
    fn test_defaults() {
        let cfg = HarnessConfig::default();
        assert_eq!(cfg.session_retry.max_attempts(), 10);
        assert_eq!(cfg.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.event_fetch_timeout, Duration::from_millis(500));

        let cfg = HarnessConfig {
            default_command_timeout: Duration::ZERO,
            bus_capacity: 0,
            ..HarnessConfig::default()
        };
        assert_eq!(cfg.command_timeout(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
