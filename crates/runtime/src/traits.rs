use async_trait::async_trait;
use netlab_core::{ExecCmd, ExecResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;

/// Label carrying the lab name on every container the orchestrator creates.
pub const LABEL_LAB: &str = "netlab.lab";
/// Label carrying the node name.
pub const LABEL_NODE: &str = "netlab.node";
/// Label carrying the node kind.
pub const LABEL_KIND: &str = "netlab.kind";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
    Removed,
}

impl ContainerState {
    /// Map a backend status word (`running`, `exited`, ...) onto the generic state.
    pub fn from_status(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "created" | "configured" | "initialized" => Self::Created,
            "running" | "restarting" => Self::Running,
            "removing" | "removed" => Self::Removed,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime-agnostic view of one backend instance.
///
/// Built by backends only; nodes keep it as a read-only handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct GenericContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub labels: BTreeMap<String, String>,
    pub pid: Option<u32>,
    /// Network namespace handle, `/proc/<pid>/ns/net` while the container runs.
    pub netns: Option<PathBuf>,
}

impl GenericContainer {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        state: ContainerState,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            state,
            labels: BTreeMap::new(),
            pid: None,
            netns: None,
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Record the init pid; a zero pid (stopped container) clears the namespace handle.
    pub fn with_pid(mut self, pid: u32) -> Self {
        if pid == 0 {
            self.pid = None;
            self.netns = None;
        } else {
            self.pid = Some(pid);
            self.netns = Some(PathBuf::from(format!("/proc/{pid}/ns/net")));
        }
        self
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }
}

/// Everything a backend needs to create one container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub cmd: Option<Vec<String>>,
    pub binds: Vec<String>,
    pub privileged: bool,
    pub network_mode: Option<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.binds.push(bind.into());
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_network_mode(mut self, mode: impl Into<String>) -> Self {
        self.network_mode = Some(mode.into());
        self
    }

    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Selects containers by exact name and/or label values. An empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    pub name: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl ContainerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every container of one lab.
    pub fn lab(lab: impl Into<String>) -> Self {
        Self::new().with_label(LABEL_LAB, lab)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// `key=value` strings in the form both Docker and Podman accept.
    pub fn label_selectors(&self) -> Vec<String> {
        self.labels.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    pub fn matches(&self, container: &GenericContainer) -> bool {
        if let Some(name) = &self.name {
            if container.name.trim_start_matches('/') != name {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| container.labels.get(k) == Some(v))
    }
}

/// Uniform interface over a container backend.
///
/// Implementations must be safe to share between node tasks. Dropping a returned
/// future stops waiting for the backend; for `exec` it does not guarantee the
/// process inside the container is killed.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Get the name of the runtime backend
    fn name(&self) -> &'static str;

    /// Check that the backend daemon or binary answers
    async fn ping(&self) -> Result<()>;

    /// Make the image available locally; a no-op when it already is
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Current containers matching the filter, queried fresh from the backend
    async fn get_containers(&self, filter: &ContainerFilter) -> Result<Vec<GenericContainer>>;

    /// Create and start a container. A container that fails to start is removed
    /// before the error is returned.
    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<GenericContainer>;

    /// Run a command inside a running container.
    ///
    /// A command that could not be started comes back as `Ok` with a layer failure
    /// in the result; `Err` means the backend itself could not be reached or the
    /// command's timeout elapsed.
    async fn exec(&self, container: &str, cmd: &ExecCmd) -> Result<ExecResult>;

    /// Remove a container. Removing a missing container succeeds.
    async fn delete(&self, container: &str) -> Result<()>;
}
