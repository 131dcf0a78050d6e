use netlab_core::NodePhase;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::DeployError;

/// Where one node ended up.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub node: String,
    pub kind: String,
    pub phase: NodePhase,
    pub container_id: Option<String>,
    pub error: Option<DeployError>,
}

impl NodeReport {
    pub fn new(node: impl Into<String>, kind: impl Into<String>, phase: NodePhase) -> Self {
        Self {
            node: node.into(),
            kind: kind.into(),
            phase,
            container_id: None,
            error: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.phase == NodePhase::Ready
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploySummary {
    pub lab: String,
    /// In topology declaration order.
    pub nodes: Vec<NodeReport>,
    pub elapsed: Duration,
}

impl DeploySummary {
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|r| r.node == name)
    }

    pub fn ready_count(&self) -> usize {
        self.nodes.iter().filter(|r| r.is_ready()).count()
    }

    /// Nodes that did not reach Ready, including those left Running after a
    /// failed config push.
    pub fn failed(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|r| !r.is_ready())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

impl fmt::Display for DeploySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .nodes
            .iter()
            .map(|r| r.node.len())
            .max()
            .unwrap_or(0)
            .max("NODE".len());

        writeln!(f, "{:<width$}  {:<8}  {:<13}  ERROR", "NODE", "KIND", "PHASE")?;
        for report in &self.nodes {
            let error = report
                .error
                .as_ref()
                .map(|e| format!("[{}] {}", e.kind, e.message))
                .unwrap_or_default();
            writeln!(
                f,
                "{:<width$}  {:<8}  {:<13}  {}",
                report.node,
                report.kind,
                report.phase.as_str(),
                error
            )?;
        }
        write!(
            f,
            "{}/{} nodes ready in {:.1}s",
            self.ready_count(),
            self.nodes.len(),
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn summary() -> DeploySummary {
        let mut failed = NodeReport::new("r2", "srl", NodePhase::Failed);
        failed.error = Some(DeployError::new(
            "r2",
            ErrorKind::Runtime,
            NodePhase::HostChecked,
            "pull failed",
        ));
        DeploySummary {
            lab: "lab".to_string(),
            nodes: vec![NodeReport::new("r1", "linux", NodePhase::Ready), failed],
            elapsed: Duration::from_millis(1500),
        }
    }

    #[test]
    fn test_counts() {
        let summary = summary();
        assert_eq!(summary.ready_count(), 1);
        assert!(!summary.is_success());
        assert_eq!(summary.failed().map(|r| r.node.as_str()).collect::<Vec<_>>(), vec!["r2"]);
    }

    #[test]
    fn test_display_lists_errors() {
        let text = summary().to_string();
        assert!(text.contains("r1    linux     ready"));
        assert!(text.contains("[runtime] pull failed"));
        assert!(text.ends_with("1/2 nodes ready in 1.5s"));
    }
}
