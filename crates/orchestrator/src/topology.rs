use netlab_core::{Link, NodeConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::graph::DependencyGraph;

/// Validated node and link lists of one lab, as handed over by the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    /// Directory relative startup-config and license paths resolve against.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub links: Vec<Link>,
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Topology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir: default_dir(),
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn graph(&self) -> Result<DependencyGraph> {
        DependencyGraph::build(self.nodes.iter().map(|n| n.name.clone()), &self.links)
    }

    /// Node configs with each node's link interfaces filled in.
    pub fn resolved_nodes(&self) -> Vec<NodeConfig> {
        self.nodes
            .iter()
            .map(|node| {
                self.links
                    .iter()
                    .flat_map(|link| link.endpoints())
                    .filter(|ep| ep.node == node.name)
                    .fold(node.clone(), |cfg, ep| cfg.with_interface(&ep.interface))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netlab_core::Endpoint;

    fn topology() -> Topology {
        Topology::new("lab1")
            .with_node(NodeConfig::new("r1", "linux", "alpine:3"))
            .with_node(NodeConfig::new("r2", "linux", "alpine:3").with_interface("eth9"))
            .with_link(Link::new(Endpoint::new("r1", "eth1"), Endpoint::new("r2", "eth1")))
            .with_link(Link::new(Endpoint::new("r1", "eth2"), Endpoint::new("r2", "eth2")))
    }

    #[test]
    fn test_resolved_nodes_collect_link_interfaces() {
        let nodes = topology().resolved_nodes();
        assert_eq!(nodes[0].interfaces, vec!["eth1", "eth2"]);
        assert_eq!(nodes[1].interfaces, vec!["eth9", "eth1", "eth2"]);
    }

    #[test]
    fn test_graph_from_links() {
        let graph = topology().graph().unwrap();
        assert_eq!(graph.dependencies("r2").collect::<Vec<_>>(), vec!["r1"]);
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{"name":"lab","nodes":[{"name":"r1","kind":"linux","image":"alpine"}]}"#;
        let topo: Topology = serde_json::from_str(json).unwrap();
        assert_eq!(topo.dir, PathBuf::from("."));
        assert!(topo.links.is_empty());
        assert!(topo.node("r1").is_some());
    }
}
