//! Node dependency graph derived from the link list.
//!
//! For a link `(a, b)` the `b` endpoint is wired into `a`'s namespace, so `b`
//! depends on `a`. Loopback links add no edge.

use netlab_core::Link;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Declaration order.
    nodes: Vec<String>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn build<I, S>(nodes: I, links: &[Link]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::default();
        for node in nodes {
            let node = node.into();
            if graph.dependencies.contains_key(&node) {
                return Err(OrchestratorError::DuplicateNode(node));
            }
            graph.dependencies.insert(node.clone(), BTreeSet::new());
            graph.dependents.insert(node.clone(), BTreeSet::new());
            graph.nodes.push(node);
        }

        for link in links {
            for endpoint in link.endpoints() {
                if !graph.dependencies.contains_key(&endpoint.node) {
                    return Err(OrchestratorError::unknown_peer(
                        format!("{} <-> {}", link.a, link.b),
                        &endpoint.node,
                    ));
                }
            }
            if link.is_loopback() {
                continue;
            }
            graph.add_edge(&link.a.node, &link.b.node);
        }

        Ok(graph)
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        if let Some(deps) = self.dependencies.get_mut(to) {
            deps.insert(from.to_string());
        }
        if let Some(dependents) = self.dependents.get_mut(from) {
            dependents.insert(to.to_string());
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes that must be Running before `node` may start.
    pub fn dependencies(&self, node: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(node)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn dependents(&self, node: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(node)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Groups of nodes that may start together, in dependency order (Kahn).
    /// Fails with the nodes left over when the graph has a cycle.
    pub fn waves(&self) -> Result<Vec<Vec<String>>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(node, deps)| (node.as_str(), deps.len()))
            .collect();

        let mut waves = Vec::new();
        loop {
            let wave: Vec<String> = self
                .nodes
                .iter()
                .filter(|n| remaining.get(n.as_str()) == Some(&0))
                .cloned()
                .collect();
            if wave.is_empty() {
                break;
            }
            for node in &wave {
                remaining.remove(node.as_str());
                for dependent in self.dependents(node) {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                    }
                }
            }
            waves.push(wave);
        }

        if !remaining.is_empty() {
            let cycle = remaining.keys().map(|n| n.to_string()).collect();
            return Err(OrchestratorError::DependencyCycle(cycle));
        }
        Ok(waves)
    }

    pub fn check_acyclic(&self) -> Result<()> {
        self.waves().map(|_| ())
    }
}
