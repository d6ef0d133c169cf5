//! # External collaborator seams of the driver.
//!
//! - [`RemoteApi`]: the virtualization product's remote object API, reduced to
//!   what the orchestration flows call;
//! - [`ProcessControl`]: host process supervision (last-resort VM teardown).
//!
//! Every remote failure is a [`RemoteError`]; adapters fold their transport's
//! exceptions into its single kind enumeration.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::{EventSource, SessionState};
use crate::config::ApiCapabilities;
use crate::error::RemoteError;
use crate::txs::Connector;

/// A session attached to a machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHandle {
    /// Machine UUID.
    pub machine_id: String,
    /// Machine name.
    pub vm_name: String,
    /// PID of the VM process, once known.
    pub pid: Option<u32>,
}

/// Session status of a machine as reported by the API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub state: SessionState,
    /// Session name (frontend type) of the current holder; empty when unlocked.
    pub name: String,
    pub pid: Option<u32>,
}

/// Environment handed to a launched VM process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchEnv {
    /// `KEY=value` entries, for APIs taking a list.
    List(Vec<String>),
    /// Newline-joined entries, for older APIs.
    Joined(String),
}

impl LaunchEnv {
    /// Shapes `vars` the way the API generation described by `caps` expects.
    pub fn build(vars: Vec<String>, caps: &ApiCapabilities) -> Self {
        if caps.launch_env_as_list {
            LaunchEnv::List(vars)
        } else {
            LaunchEnv::Joined(vars.join("\n"))
        }
    }

    /// Entries regardless of representation.
    pub fn entries(&self) -> Vec<&str> {
        match self {
            LaunchEnv::List(vars) => vars.iter().map(String::as_str).collect(),
            LaunchEnv::Joined(s) => s.lines().filter(|l| !l.is_empty()).collect(),
        }
    }
}

/// Remote object API used by the driver.
#[async_trait]
pub trait RemoteApi: Send + Sync + 'static {
    /// Current session state of `vm`.
    async fn session_info(&self, vm: &str) -> Result<SessionInfo, RemoteError>;

    /// Opens an administrative (shared) session on `vm`.
    async fn open_session(&self, vm: &str) -> Result<SessionHandle, RemoteError>;

    /// Spawns the VM process for `vm` and returns its session.
    async fn launch_vm(
        &self,
        vm: &str,
        session_type: &str,
        env: &LaunchEnv,
    ) -> Result<SessionHandle, RemoteError>;

    /// Event source of the console behind `session`.
    async fn event_source(&self, session: &SessionHandle) -> Result<Arc<dyn EventSource>, RemoteError>;

    /// Powers the VM off.
    async fn power_off(&self, session: &SessionHandle) -> Result<(), RemoteError>;

    /// Releases the session lock.
    async fn close_session(&self, session: &SessionHandle) -> Result<(), RemoteError>;

    /// Connector to the TXS in the guest of `session`.
    ///
    /// With `nat` the connection goes through the host's port forwarding.
    async fn txs_connector(
        &self,
        session: &SessionHandle,
        nat: bool,
    ) -> Result<Arc<dyn Connector>, RemoteError>;
}

/// Host process supervision.
pub trait ProcessControl: Send + Sync + 'static {
    fn is_alive(&self, pid: u32) -> bool;

    /// Sends a terminate request; `true` if it was delivered.
    fn terminate(&self, pid: u32) -> bool;

    /// Sends an interrupt; `true` if it was delivered.
    fn interrupt(&self, pid: u32) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiVersion;

    #[test]
    fn test_launch_env_shape_follows_capabilities() {
        let vars = vec!["VM_LOG=all".to_string(), "VM_LOG_FLAGS=time".to_string()];

        let env = LaunchEnv::build(vars.clone(), &ApiCapabilities::resolve(ApiVersion::new(6, 1)));
        assert_eq!(env, LaunchEnv::List(vars.clone()));

        let env = LaunchEnv::build(vars, &ApiCapabilities::resolve(ApiVersion::new(5, 2)));
        assert_eq!(env, LaunchEnv::Joined("VM_LOG=all\nVM_LOG_FLAGS=time".into()));
        assert_eq!(env.entries(), vec!["VM_LOG=all", "VM_LOG_FLAGS=time"]);
    }
}
