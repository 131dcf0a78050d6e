use netlab_core::{Credentials, ExecCmd, ExecResult, NodeConfig};
use runtime::{
    ContainerFilter, ContainerRuntime, ContainerSpec, GenericContainer, LABEL_KIND, LABEL_LAB,
    LABEL_NODE,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::contract::NodeContext;
use crate::error::{NodeError, Result};
use crate::host::HostRequirements;
use crate::interfaces::InterfaceRule;

/// Baseline behavior shared by all kinds.
pub struct DefaultNode {
    config: NodeConfig,
    ctx: Arc<NodeContext>,
}

impl DefaultNode {
    pub fn new(config: NodeConfig, ctx: Arc<NodeContext>) -> Self {
        Self { config, ctx }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.ctx.runtime
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn container_name(&self) -> String {
        if self.ctx.prefix.is_empty() {
            format!("{}-{}", self.ctx.lab, self.config.name)
        } else {
            format!("{}-{}-{}", self.ctx.prefix, self.ctx.lab, self.config.name)
        }
    }

    /// Node override, else the deployment default.
    pub fn credentials(&self) -> &Credentials {
        Credentials::resolve(self.config.credentials.as_ref(), &self.ctx.default_credentials)
    }

    /// Labels identifying this node's containers.
    pub fn identity_filter(&self) -> ContainerFilter {
        ContainerFilter::lab(&self.ctx.lab).with_label(LABEL_NODE, &self.config.name)
    }

    pub fn verify_host_requirements(&self, requirements: &HostRequirements) -> Result<()> {
        let unmet = requirements.unmet(&self.ctx.host);
        if unmet.is_empty() {
            return Ok(());
        }
        Err(NodeError::host_requirement(self.name(), unmet.join("; ")))
    }

    pub fn check_interface_names(&self, rule: &InterfaceRule) -> Result<()> {
        rule.check(self.name(), &self.config.interfaces)
    }

    pub fn get_images(&self) -> BTreeMap<String, String> {
        let mut images = BTreeMap::new();
        images.insert("image".to_string(), self.config.image.clone());
        if let Some(sidecar) = &self.config.sidecar_image {
            images.insert("sidecar".to_string(), sidecar.clone());
        }
        images
    }

    pub async fn pull_images(&self, images: &BTreeMap<String, String>) -> Result<()> {
        for (component, image) in images {
            debug!(node = %self.name(), component = %component, image = %image, "Ensuring image");
            self.runtime()
                .pull_image(image)
                .await
                .map_err(|e| NodeError::runtime(self.name(), e))?;
        }
        Ok(())
    }

    pub async fn get_containers(&self) -> Result<Vec<GenericContainer>> {
        self.runtime()
            .get_containers(&self.identity_filter())
            .await
            .map_err(|e| NodeError::runtime(self.name(), e))
    }

    pub async fn running_container(&self) -> Result<GenericContainer> {
        self.get_containers()
            .await?
            .into_iter()
            .find(GenericContainer::is_running)
            .ok_or_else(|| NodeError::NotRunning(self.name().to_string()))
    }

    pub async fn run_exec(&self, cmd: &ExecCmd) -> Result<ExecResult> {
        let container = self.running_container().await?;
        let cmd = cmd.targeted(&container.name);
        debug!(node = %self.name(), cmd = %cmd.command_line(), "Running exec");

        self.runtime()
            .exec(&container.id, &cmd)
            .await
            .map_err(|e| NodeError::runtime(self.name(), e))
    }

    /// Like [`run_exec`](Self::run_exec), but a command that could not run or
    /// exited non-zero is an error.
    pub async fn run_checked(&self, cmd: &ExecCmd) -> Result<ExecResult> {
        let result = self.run_exec(cmd).await?;
        if let Some(reason) = result.layer_failure() {
            return Err(NodeError::execution(self.name(), cmd.command_line(), reason));
        }
        if !result.success() {
            let code = result.exit_code().unwrap_or(-1);
            return Err(NodeError::execution(
                self.name(),
                cmd.command_line(),
                format!("exit code {code}: {}", result.stderr.trim()),
            ));
        }
        Ok(result)
    }

    /// Relative paths are taken from the topology directory.
    pub fn resolve_path(&self, path: &Path, topo_dir: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            topo_dir.join(path)
        }
    }

    /// The resolved path and content of the startup config, if one is set.
    pub fn read_startup_config(&self, topo_dir: &Path) -> Result<Option<(PathBuf, String)>> {
        let Some(path) = &self.config.startup_config else {
            return Ok(None);
        };
        let path = self.resolve_path(path, topo_dir);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            NodeError::startup_config(self.name(), format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(Some((path, content)))
    }

    pub fn container_spec(&self, kind: &str) -> ContainerSpec {
        let mut spec = ContainerSpec::new(self.container_name(), &self.config.image)
            .with_hostname(&self.config.name);

        spec.labels = self.config.labels.clone();
        spec.labels.insert(LABEL_LAB.to_string(), self.ctx.lab.clone());
        spec.labels.insert(LABEL_NODE.to_string(), self.config.name.clone());
        spec.labels.insert(LABEL_KIND.to_string(), kind.to_string());
        spec.env = self.config.env.clone();
        spec.binds = self.config.binds.clone();
        spec.cmd = self.config.cmd.clone();
        spec
    }

    /// Bind `source` (resolved against the topology directory) at `target`.
    pub fn bind(&self, source: &Path, target: &str) -> String {
        let source = self.resolve_path(source, &self.ctx.topology_dir);
        debug!(node = %self.name(), source = %source.display(), mount = target, "Binding file");
        format!("{}:{target}", source.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_push::session::recording::RecordingConnector;
    use runtime::FakeRuntime;

    fn ctx(runtime: Arc<FakeRuntime>) -> Arc<NodeContext> {
        Arc::new(NodeContext::new("lab1", runtime, Arc::new(RecordingConnector::new())))
    }

    fn node(runtime: Arc<FakeRuntime>) -> DefaultNode {
        let config = NodeConfig::new("r1", "linux", "alpine:3").with_interface("eth1");
        DefaultNode::new(config, ctx(runtime))
    }

    #[test]
    fn test_container_name() {
        let n = node(Arc::new(FakeRuntime::new()));
        assert_eq!(n.container_name(), "clab-lab1-r1");

        let bare = NodeContext::new(
            "lab1",
            Arc::new(FakeRuntime::new()),
            Arc::new(RecordingConnector::new()),
        )
        .with_prefix("");
        let n = DefaultNode::new(NodeConfig::new("r1", "linux", "alpine:3"), Arc::new(bare));
        assert_eq!(n.container_name(), "lab1-r1");
    }

    #[test]
    fn test_credentials_fallback() {
        let runtime = Arc::new(FakeRuntime::new());
        assert_eq!(node(runtime.clone()).credentials().username, "admin");

        let config = NodeConfig::new("r1", "linux", "alpine:3")
            .with_credentials(Credentials::new("netops", "pw"));
        let n = DefaultNode::new(config, ctx(runtime));
        assert_eq!(n.credentials().username, "netops");
    }

    #[test]
    fn test_container_spec_labels() {
        let n = node(Arc::new(FakeRuntime::new()));
        let spec = n.container_spec("linux");

        assert_eq!(spec.name, "clab-lab1-r1");
        assert_eq!(spec.hostname.as_deref(), Some("r1"));
        assert_eq!(spec.labels.get(LABEL_LAB).map(String::as_str), Some("lab1"));
        assert_eq!(spec.labels.get(LABEL_NODE).map(String::as_str), Some("r1"));
        assert_eq!(spec.labels.get(LABEL_KIND).map(String::as_str), Some("linux"));
    }

    #[test]
    fn test_get_images_includes_sidecar() {
        let runtime = Arc::new(FakeRuntime::new());
        let mut config = NodeConfig::new("r1", "linux", "alpine:3");
        config.sidecar_image = Some("busybox:1".to_string());
        let n = DefaultNode::new(config, ctx(runtime));

        let images = n.get_images();
        assert_eq!(images.get("image").map(String::as_str), Some("alpine:3"));
        assert_eq!(images.get("sidecar").map(String::as_str), Some("busybox:1"));
    }

    #[tokio::test]
    async fn test_run_exec_without_container_is_not_running() {
        let n = node(Arc::new(FakeRuntime::new()));
        let err = n
            .run_exec(&ExecCmd::from_string("hostname").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::NotRunning(ref name) if name == "r1"));
    }

    #[tokio::test]
    async fn test_run_exec_in_running_container() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_image("alpine:3")
                .with_exec_response("hostname", 0, "r1\n"),
        );
        let n = node(runtime.clone());
        runtime
            .create_and_start(&n.container_spec("linux"))
            .await
            .unwrap();

        let result = n
            .run_exec(&ExecCmd::from_string("hostname").unwrap())
            .await
            .unwrap();
        assert_eq!(result.stdout, "r1\n");
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_run_checked_reports_failures() {
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_image("alpine:3")
                .with_exec_response("false", 1, "")
                .with_missing_program("nope"),
        );
        let n = node(runtime.clone());
        runtime
            .create_and_start(&n.container_spec("linux"))
            .await
            .unwrap();

        let err = n
            .run_checked(&ExecCmd::from_string("false").unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code 1"));

        let err = n
            .run_checked(&ExecCmd::from_string("nope").unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("executable file not found"));
    }

    #[test]
    fn test_read_startup_config_relative_to_topology() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("r1.cfg"), "hostname r1\n").unwrap();

        let runtime = Arc::new(FakeRuntime::new());
        let config = NodeConfig::new("r1", "linux", "alpine:3").with_startup_config("r1.cfg");
        let n = DefaultNode::new(config, ctx(runtime));

        let (path, content) = n.read_startup_config(dir.path()).unwrap().unwrap();
        assert_eq!(path, dir.path().join("r1.cfg"));
        assert_eq!(content, "hostname r1\n");

        let missing = NodeConfig::new("r2", "linux", "alpine:3").with_startup_config("nope.cfg");
        let n = DefaultNode::new(missing, ctx(Arc::new(FakeRuntime::new())));
        assert!(matches!(
            n.read_startup_config(dir.path()),
            Err(NodeError::StartupConfig { .. })
        ));
    }

    #[test]
    fn test_host_requirements_failure_names_node() {
        let n = node(Arc::new(FakeRuntime::new()));
        let err = n
            .verify_host_requirements(&HostRequirements::none().with_virtualization())
            .unwrap_err();
        assert!(matches!(err, NodeError::HostRequirement { ref node, .. } if node == "r1"));
    }
}
