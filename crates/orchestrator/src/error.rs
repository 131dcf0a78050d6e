use netlab_core::NodePhase;
use nodes::NodeError;
use runtime::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that stop a whole deployment (or a lab-wide operation) before or
/// outside of per-node work.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Node declared twice: {0}")]
    DuplicateNode(String),

    #[error("Link {link} references unknown node {node}")]
    UnknownLinkPeer { link: String, node: String },

    #[error("Dependency cycle between nodes: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl OrchestratorError {
    pub fn invalid_transition(from: NodePhase, to: NodePhase) -> Self {
        Self::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    pub fn unknown_peer(link: impl Into<String>, node: impl Into<String>) -> Self {
        Self::UnknownLinkPeer {
            link: link.into(),
            node: node.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Category of a per-node failure, as reported in events and the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Host, interface, startup-config or license check; never retried.
    Preflight,
    /// Backend call failed after retries.
    Runtime,
    /// A command inside the container failed or could not run.
    Execution,
    /// Post-deploy configuration push failed; the container keeps running.
    ConfigPush,
    /// A node this one depends on never reached Running.
    Dependency,
    /// Cancelled, or the phase deadline passed.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Runtime => "runtime",
            Self::Execution => "execution",
            Self::ConfigPush => "config_push",
            Self::Dependency => "dependency",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn of(err: &NodeError) -> Self {
        match err {
            e if e.is_preflight() => Self::Preflight,
            NodeError::Runtime { .. } => Self::Runtime,
            NodeError::ConfigPush { .. } => Self::ConfigPush,
            _ => Self::Execution,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one node, tagged with the last phase it reached.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{node}: {kind} failure after {phase}: {message}")]
pub struct DeployError {
    pub node: String,
    pub kind: ErrorKind,
    pub phase: NodePhase,
    pub message: String,
}

impl DeployError {
    pub fn new(
        node: impl Into<String>,
        kind: ErrorKind,
        phase: NodePhase,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            kind,
            phase,
            message: message.into(),
        }
    }

    pub fn from_node(node: impl Into<String>, phase: NodePhase, err: &NodeError) -> Self {
        Self::new(node, ErrorKind::of(err), phase, err.to_string())
    }

    pub fn dependency(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(node, ErrorKind::Dependency, NodePhase::Pending, message)
    }

    pub fn cancelled(node: impl Into<String>, phase: NodePhase, message: impl Into<String>) -> Self {
        Self::new(node, ErrorKind::Cancelled, phase, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::config_push::PushError;

    #[test]
    fn test_error_kind_of_node_errors() {
        assert_eq!(
            ErrorKind::of(&NodeError::host_requirement("r1", "no vmx")),
            ErrorKind::Preflight
        );
        assert_eq!(
            ErrorKind::of(&NodeError::runtime("r1", RuntimeError::image_pull("a", "b"))),
            ErrorKind::Runtime
        );
        assert_eq!(
            ErrorKind::of(&NodeError::NotRunning("r1".to_string())),
            ErrorKind::Execution
        );
        assert_eq!(
            ErrorKind::of(&NodeError::config_push("r1", PushError::NoManagementAddress)),
            ErrorKind::ConfigPush
        );
    }

    #[test]
    fn test_deploy_error_display() {
        let err = DeployError::new("r1", ErrorKind::Runtime, NodePhase::HostChecked, "pull failed");
        assert_eq!(
            err.to_string(),
            "r1: runtime failure after host_checked: pull failed"
        );
    }

    #[test]
    fn test_cycle_error_lists_nodes() {
        let err = OrchestratorError::DependencyCycle(vec!["a".to_string(), "b".to_string()]);
        assert!(err.to_string().contains("a, b"));
    }
}
