use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a single node during a deployment run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodePhase {
    #[default]
    Pending,
    HostChecked,
    ImagePulled,
    Created,
    Running,
    PostDeployed,
    Ready,
    Failed,
}

impl NodePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::HostChecked => "host_checked",
            Self::ImagePulled => "image_pulled",
            Self::Created => "created",
            Self::Running => "running",
            Self::PostDeployed => "post_deployed",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "host_checked" => Some(Self::HostChecked),
            "image_pulled" => Some(Self::ImagePulled),
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "post_deployed" => Some(Self::PostDeployed),
            "ready" => Some(Self::Ready),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// True once the backing container is up, i.e. dependents may be wired to it.
    pub fn has_reached_running(&self) -> bool {
        matches!(self, Self::Running | Self::PostDeployed | Self::Ready)
    }
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_as_str() {
        assert_eq!(NodePhase::Pending.as_str(), "pending");
        assert_eq!(NodePhase::HostChecked.as_str(), "host_checked");
        assert_eq!(NodePhase::PostDeployed.as_str(), "post_deployed");
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!(NodePhase::parse("running"), Some(NodePhase::Running));
        assert_eq!(NodePhase::parse("image_pulled"), Some(NodePhase::ImagePulled));
        assert_eq!(NodePhase::parse("invalid"), None);
    }

    #[test]
    fn test_reached_running() {
        assert!(!NodePhase::Created.has_reached_running());
        assert!(NodePhase::Running.has_reached_running());
        assert!(NodePhase::Ready.has_reached_running());
        assert!(!NodePhase::Failed.has_reached_running());
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&NodePhase::HostChecked).unwrap();
        assert_eq!(json, "\"host_checked\"");
    }
}
