use runtime::RuntimeError;
use thiserror::Error;

use crate::config_push::PushError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Host requirements not met for node {node}: {reason}")]
    HostRequirement { node: String, reason: String },

    #[error("Invalid interface name '{interface}' on node {node}: {reason}")]
    InterfaceName {
        node: String,
        interface: String,
        reason: String,
    },

    #[error("Startup config of node {node}: {reason}")]
    StartupConfig { node: String, reason: String },

    #[error("License of node {node}: {reason}")]
    License { node: String, reason: String },

    #[error("Unknown node kind: {0}")]
    UnknownKind(String),

    #[error("Node {0} has no running container")]
    NotRunning(String),

    #[error("Command `{cmd}` on node {node} failed: {reason}")]
    Execution {
        node: String,
        cmd: String,
        reason: String,
    },

    #[error("Runtime error on node {node}: {source}")]
    Runtime {
        node: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Config push to node {node} failed: {source}")]
    ConfigPush {
        node: String,
        #[source]
        source: PushError,
    },
}

impl NodeError {
    pub fn host_requirement(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HostRequirement {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn interface_name(
        node: impl Into<String>,
        interface: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InterfaceName {
            node: node.into(),
            interface: interface.into(),
            reason: reason.into(),
        }
    }

    pub fn startup_config(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StartupConfig {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn license(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::License {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(
        node: impl Into<String>,
        cmd: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Execution {
            node: node.into(),
            cmd: cmd.into(),
            reason: reason.into(),
        }
    }

    pub fn runtime(node: impl Into<String>, source: RuntimeError) -> Self {
        Self::Runtime {
            node: node.into(),
            source,
        }
    }

    pub fn config_push(node: impl Into<String>, source: PushError) -> Self {
        Self::ConfigPush {
            node: node.into(),
            source,
        }
    }

    /// Failures detected before any runtime call; never retried.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::HostRequirement { .. }
                | Self::InterfaceName { .. }
                | Self::StartupConfig { .. }
                | Self::License { .. }
                | Self::UnknownKind(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Runtime { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(NodeError::license("r1", "missing").is_preflight());
        assert!(!NodeError::NotRunning("r1".into()).is_preflight());

        let pull = NodeError::runtime("r1", RuntimeError::image_pull("alpine", "timeout"));
        assert!(pull.is_retryable());
        assert!(!pull.is_preflight());

        let missing = NodeError::runtime("r1", RuntimeError::ContainerNotFound("x".into()));
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_display_carries_node() {
        let err = NodeError::execution("srl1", "sr_cli info", "exit code 1");
        assert_eq!(
            err.to_string(),
            "Command `sr_cli info` on node srl1 failed: exit code 1"
        );
    }
}
