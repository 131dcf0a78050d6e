//! SR OS running as a VM inside a container.
//!
//! Needs hardware virtualization and a license file. Once running, the admin
//! user's SSH public keys are pushed over the management session.

use async_trait::async_trait;
use netlab_core::NodeConfig;
use runtime::ContainerSpec;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config_push::template::SROS_SSH_KEYS;
use crate::config_push::{parse_authorized_keys, ConfigPusher, PushError, SrosTemplateData};
use crate::contract::{Node, NodeContext};
use crate::default_node::DefaultNode;
use crate::error::{NodeError, Result};
use crate::host::HostRequirements;
use crate::interfaces;

pub const KIND: &str = "vr-sros";

const LICENSE_TARGET: &str = "/tftpboot/license.txt";
const CONFIG_TARGET: &str = "/tftpboot/config.txt";
const DEFAULT_VARIANT: &str = "sr-1";

const DEFAULT_PUSH_ATTEMPTS: u32 = 60;
const DEFAULT_PUSH_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct VrSrosNode {
    base: DefaultNode,
    push_attempts: u32,
    push_retry_delay: Duration,
}

impl VrSrosNode {
    pub fn new(config: NodeConfig, ctx: Arc<NodeContext>) -> Self {
        Self {
            base: DefaultNode::new(config, ctx),
            push_attempts: DEFAULT_PUSH_ATTEMPTS,
            push_retry_delay: DEFAULT_PUSH_RETRY_DELAY,
        }
    }

    /// How long to keep trying the management session while the VM boots.
    pub fn with_push_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.push_attempts = attempts;
        self.push_retry_delay = delay;
        self
    }

    fn requirements() -> HostRequirements {
        HostRequirements::none()
            .with_virtualization()
            .with_min_vcpus(2)
    }

    async fn configure_ssh_keys(&self) -> std::result::Result<usize, PushError> {
        let keys = parse_authorized_keys(&self.config().ssh_pub_keys)?;
        let data = SrosTemplateData::from_keys(&keys);
        if data.is_empty() {
            warn!(node = %self.name(), "No supported SSH public keys to configure");
            return Ok(0);
        }

        let addr = self
            .config()
            .mgmt_ipv4
            .as_deref()
            .ok_or(PushError::NoManagementAddress)?;

        let pusher = ConfigPusher::new(Arc::clone(&self.base.context().connector))?
            .with_connect_retries(self.push_attempts, self.push_retry_delay);
        pusher
            .push(addr, self.base.credentials(), SROS_SSH_KEYS, &data)
            .await?;
        Ok(data.len())
    }
}

#[async_trait]
impl Node for VrSrosNode {
    fn base(&self) -> &DefaultNode {
        &self.base
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn verify_host_requirements(&self) -> Result<()> {
        self.base.verify_host_requirements(&Self::requirements())
    }

    fn check_interface_name(&self) -> Result<()> {
        self.base.check_interface_names(&interfaces::VR)
    }

    async fn verify_license_file_exists(&self) -> Result<()> {
        let Some(license) = &self.config().license else {
            return Err(NodeError::license(self.name(), "a license file is required"));
        };
        let path = self
            .base
            .resolve_path(license, &self.base.context().topology_dir);

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            NodeError::license(self.name(), format!("{}: {e}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(NodeError::license(
                self.name(),
                format!("{} is not a file", path.display()),
            ));
        }
        tokio::fs::File::open(&path).await.map_err(|e| {
            NodeError::license(self.name(), format!("{} is not readable: {e}", path.display()))
        })?;

        debug!(node = %self.name(), license = %path.display(), "License file found");
        Ok(())
    }

    fn verify_startup_config(&self, topo_dir: &Path) -> Result<()> {
        match self.base.read_startup_config(topo_dir)? {
            Some((path, content)) if content.trim().is_empty() => Err(NodeError::startup_config(
                self.name(),
                format!("{} is empty", path.display()),
            )),
            _ => Ok(()),
        }
    }

    fn container_spec(&self) -> ContainerSpec {
        let credentials = self.base.credentials();
        let mut spec = self
            .base
            .container_spec(KIND)
            .privileged(true)
            .with_env("CONNECTION_MODE", "tc")
            .with_env("USERNAME", &credentials.username)
            .with_env("PASSWORD", &credentials.password);

        if spec.cmd.is_none() {
            spec.cmd = Some(
                [
                    "--trace",
                    "--connection-mode",
                    "tc",
                    "--hostname",
                    self.name(),
                    "--variant",
                    DEFAULT_VARIANT,
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            );
        }
        if let Some(license) = &self.config().license {
            spec.binds.push(self.base.bind(license, LICENSE_TARGET));
        }
        if let Some(config) = &self.config().startup_config {
            spec.binds.push(self.base.bind(config, CONFIG_TARGET));
        }
        spec
    }

    async fn post_deploy(&self) -> Result<()> {
        let pushed = self
            .configure_ssh_keys()
            .await
            .map_err(|e| NodeError::config_push(self.name(), e))?;
        if pushed > 0 {
            info!(node = %self.name(), keys = pushed, "SSH public keys configured");
        }
        Ok(())
    }
}
