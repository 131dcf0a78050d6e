use async_trait::async_trait;
use netlab_core::NodeConfig;
use std::sync::Arc;

use crate::contract::{Node, NodeContext};
use crate::default_node::DefaultNode;

pub const KIND: &str = "linux";

/// Plain container; every capability uses the defaults.
pub struct LinuxNode {
    base: DefaultNode,
}

impl LinuxNode {
    pub fn new(config: NodeConfig, ctx: Arc<NodeContext>) -> Self {
        Self {
            base: DefaultNode::new(config, ctx),
        }
    }
}

#[async_trait]
impl Node for LinuxNode {
    fn base(&self) -> &DefaultNode {
        &self.base
    }

    fn kind(&self) -> &'static str {
        KIND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_push::session::recording::RecordingConnector;
    use runtime::{ContainerRuntime, FakeRuntime, LABEL_KIND};

    #[tokio::test]
    async fn test_linux_node_lifecycle_with_defaults() {
        let runtime = Arc::new(FakeRuntime::new());
        let ctx = Arc::new(NodeContext::new(
            "lab",
            runtime.clone(),
            Arc::new(RecordingConnector::new()),
        ));
        let node = LinuxNode::new(
            NodeConfig::new("h1", KIND, "alpine:3").with_interface("eth1"),
            ctx,
        );

        node.verify_host_requirements().unwrap();
        node.check_interface_name().unwrap();
        node.verify_license_file_exists().await.unwrap();
        node.pull_image().await.unwrap();
        assert!(runtime.has_image("alpine:3"));

        let spec = node.container_spec();
        assert_eq!(spec.labels.get(LABEL_KIND).map(String::as_str), Some(KIND));
        runtime.create_and_start(&spec).await.unwrap();

        assert_eq!(node.get_containers().await.unwrap().len(), 1);
        node.post_deploy().await.unwrap();
    }
}
