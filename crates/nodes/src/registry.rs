use netlab_core::NodeConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contract::{Node, NodeContext};
use crate::error::{NodeError, Result};
use crate::kinds::{linux, srl, vr_sros, LinuxNode, SrlNode, VrSrosNode};

pub type NodeConstructor = fn(NodeConfig, Arc<NodeContext>) -> Arc<dyn Node>;

/// Maps kind names, including aliases, to node constructors.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    kinds: BTreeMap<String, NodeConstructor>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every kind shipped in this crate.
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register(&[linux::KIND], |cfg, ctx| -> Arc<dyn Node> {
            Arc::new(LinuxNode::new(cfg, ctx))
        });
        registry.register(&[srl::KIND, "nokia_srlinux"], |cfg, ctx| -> Arc<dyn Node> {
            Arc::new(SrlNode::new(cfg, ctx))
        });
        registry.register(
            &[vr_sros::KIND, "vr-nokia_sros", "nokia_sros"],
            |cfg, ctx| -> Arc<dyn Node> { Arc::new(VrSrosNode::new(cfg, ctx)) },
        );
        registry
    }

    pub fn register(&mut self, names: &[&str], constructor: NodeConstructor) {
        for name in names {
            self.kinds.insert(name.to_string(), constructor);
        }
    }

    pub fn is_known(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Every registered name, aliases included.
    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    pub fn build(&self, config: NodeConfig, ctx: Arc<NodeContext>) -> Result<Arc<dyn Node>> {
        let constructor = self
            .kinds
            .get(&config.kind)
            .ok_or_else(|| NodeError::UnknownKind(config.kind.clone()))?;
        Ok(constructor(config, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_push::session::recording::RecordingConnector;
    use runtime::FakeRuntime;

    fn ctx() -> Arc<NodeContext> {
        Arc::new(NodeContext::new(
            "lab",
            Arc::new(FakeRuntime::new()),
            Arc::new(RecordingConnector::new()),
        ))
    }

    #[test]
    fn test_builtin_kinds() {
        let registry = NodeRegistry::with_builtin_kinds();
        assert!(registry.is_known("linux"));
        assert!(registry.is_known("srl"));
        assert!(registry.is_known("nokia_sros"));
        assert!(!registry.is_known("ceos"));
    }

    #[test]
    fn test_alias_builds_canonical_kind() {
        let registry = NodeRegistry::with_builtin_kinds();
        let node = registry
            .build(NodeConfig::new("s1", "nokia_srlinux", "srlinux"), ctx())
            .unwrap();
        assert_eq!(node.kind(), "srl");
        assert_eq!(node.name(), "s1");
    }

    #[test]
    fn test_unknown_kind() {
        let registry = NodeRegistry::with_builtin_kinds();
        let result = registry.build(NodeConfig::new("x", "ceos", "ceos:4"), ctx());
        assert!(matches!(result, Err(NodeError::UnknownKind(ref k)) if k == "ceos"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = NodeRegistry::new();
        registry.register(&["host"], |cfg, ctx| -> Arc<dyn Node> {
            Arc::new(LinuxNode::new(cfg, ctx))
        });
        assert_eq!(registry.kinds(), vec!["host"]);
        assert!(registry
            .build(NodeConfig::new("h", "host", "alpine"), ctx())
            .is_ok());
    }
}
