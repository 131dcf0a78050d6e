//! The capability surface every node kind exposes to the orchestrator.

use async_trait::async_trait;
use netlab_core::{Credentials, ExecCmd, ExecResult, NodeConfig};
use runtime::{ContainerRuntime, ContainerSpec, GenericContainer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config_push::SessionConnector;
use crate::default_node::DefaultNode;
use crate::error::Result;
use crate::host::HostFacts;

/// Shared, read-only state every node of one deployment sees.
pub struct NodeContext {
    pub lab: String,
    /// Leading part of container names; empty to use `<lab>-<node>`.
    pub prefix: String,
    pub topology_dir: PathBuf,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub connector: Arc<dyn SessionConnector>,
    pub default_credentials: Credentials,
    pub host: HostFacts,
}

impl NodeContext {
    pub fn new(
        lab: impl Into<String>,
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn SessionConnector>,
    ) -> Self {
        Self {
            lab: lab.into(),
            prefix: "clab".to_string(),
            topology_dir: PathBuf::from("."),
            runtime,
            connector,
            default_credentials: Credentials::default(),
            host: HostFacts::default(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_topology_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.topology_dir = dir.into();
        self
    }

    pub fn with_default_credentials(mut self, credentials: Credentials) -> Self {
        self.default_credentials = credentials;
        self
    }

    pub fn with_host_facts(mut self, host: HostFacts) -> Self {
        self.host = host;
        self
    }
}

/// One deployable node.
///
/// Every method except [`Node::base`] and [`Node::kind`] has a default that
/// delegates to the embedded [`DefaultNode`]; kinds override what differs.
#[async_trait]
pub trait Node: Send + Sync {
    fn base(&self) -> &DefaultNode;

    /// Canonical kind name.
    fn kind(&self) -> &'static str;

    fn name(&self) -> &str {
        &self.base().config().name
    }

    fn config(&self) -> &NodeConfig {
        self.base().config()
    }

    /// Runtime name of the backing container.
    fn container_name(&self) -> String {
        self.base().container_name()
    }

    /// Checked before any runtime call.
    fn verify_host_requirements(&self) -> Result<()> {
        self.base().verify_host_requirements(&Default::default())
    }

    fn check_interface_name(&self) -> Result<()> {
        self.base().check_interface_names(&crate::interfaces::LINUX)
    }

    /// Component name (`image`, `sidecar`) to image reference.
    fn get_images(&self) -> BTreeMap<String, String> {
        self.base().get_images()
    }

    async fn pull_image(&self) -> Result<()> {
        self.base().pull_images(&self.get_images()).await
    }

    async fn get_containers(&self) -> Result<Vec<GenericContainer>> {
        self.base().get_containers().await
    }

    /// Run a command in this node's container. Fails with `NotRunning` when no
    /// container of this node is running.
    async fn run_exec(&self, cmd: &ExecCmd) -> Result<ExecResult> {
        self.base().run_exec(cmd).await
    }

    async fn verify_license_file_exists(&self) -> Result<()> {
        Ok(())
    }

    /// Startup config exists (relative to `topo_dir`) and is plausible for the kind.
    fn verify_startup_config(&self, topo_dir: &Path) -> Result<()> {
        self.base().read_startup_config(topo_dir).map(|_| ())
    }

    fn container_spec(&self) -> ContainerSpec {
        self.base().container_spec(self.kind())
    }

    /// Kind-specific work once the container runs.
    async fn post_deploy(&self) -> Result<()> {
        Ok(())
    }
}
