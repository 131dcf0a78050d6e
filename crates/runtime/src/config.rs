use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::docker::DockerRuntime;
use crate::error::{Result, RuntimeError};
use crate::podman::PodmanRuntime;
use crate::traits::ContainerRuntime;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    #[default]
    Docker,
    Podman,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(RuntimeError::Config(format!("unknown runtime '{other}'"))),
        }
    }
}

/// Which backend to talk to and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub kind: RuntimeKind,
    /// Daemon socket or URL; backend default when unset.
    pub endpoint: Option<String>,
    /// Request timeout towards the backend, in seconds.
    pub timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kind: RuntimeKind::default(),
            endpoint: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RuntimeConfig {
    pub fn new(kind: RuntimeKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Build the backend selected by `config`.
pub fn connect(config: &RuntimeConfig) -> Result<Arc<dyn ContainerRuntime>> {
    debug!(
        runtime = config.kind.as_str(),
        endpoint = ?config.endpoint,
        "Connecting to container runtime"
    );

    let runtime: Arc<dyn ContainerRuntime> = match config.kind {
        RuntimeKind::Docker => Arc::new(DockerRuntime::connect(
            config.endpoint.as_deref(),
            config.timeout_secs,
        )?),
        RuntimeKind::Podman => Arc::new(PodmanRuntime::new(config.endpoint.clone())),
    };
    Ok(runtime)
}
