//! Container-based network OS with SR Linux style interfaces and startup config.

use async_trait::async_trait;
use netlab_core::{ExecCmd, NodeConfig};
use runtime::ContainerSpec;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::contract::{Node, NodeContext};
use crate::default_node::DefaultNode;
use crate::error::{NodeError, Result};
use crate::interfaces;

pub const KIND: &str = "srl";

/// Present once the management server accepts configuration.
const READY_MARKER: &str = "/etc/opt/srlinux/devices/app_ephemeral.mgmt_server.ready_for_config";
const JSON_CONFIG_TARGET: &str = "/etc/opt/srlinux/config.json";
const CLI_CONFIG_TARGET: &str = "/tmp/netlab-startup.cli";

const DEFAULT_READY_ATTEMPTS: u32 = 90;
const DEFAULT_READY_INTERVAL: Duration = Duration::from_secs(2);

pub struct SrlNode {
    base: DefaultNode,
    ready_attempts: u32,
    ready_interval: Duration,
}

impl SrlNode {
    pub fn new(config: NodeConfig, ctx: Arc<NodeContext>) -> Self {
        Self {
            base: DefaultNode::new(config, ctx),
            ready_attempts: DEFAULT_READY_ATTEMPTS,
            ready_interval: DEFAULT_READY_INTERVAL,
        }
    }

    pub fn with_readiness(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_attempts = attempts.max(1);
        self.ready_interval = interval;
        self
    }

    fn startup_is_json(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
    }

    async fn wait_ready(&self) -> Result<()> {
        let ready_check = ExecCmd::new(["test", "-f", READY_MARKER])
            .map_err(|e| NodeError::execution(self.name(), "test -f", e.to_string()))?
            .with_timeout(Duration::from_secs(10));

        for attempt in 1..=self.ready_attempts {
            let result = self.base.run_exec(&ready_check).await?;
            if let Some(reason) = result.layer_failure() {
                return Err(NodeError::execution(
                    self.name(),
                    ready_check.command_line(),
                    reason,
                ));
            }
            if result.success() {
                debug!(node = %self.name(), attempt, "Management server ready");
                return Ok(());
            }
            tokio::time::sleep(self.ready_interval).await;
        }

        Err(NodeError::execution(
            self.name(),
            ready_check.command_line(),
            format!("not ready after {} attempts", self.ready_attempts),
        ))
    }
}

#[async_trait]
impl Node for SrlNode {
    fn base(&self) -> &DefaultNode {
        &self.base
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn check_interface_name(&self) -> Result<()> {
        self.base.check_interface_names(&interfaces::SRL)
    }

    /// JSON files must parse as a JSON object; anything else is CLI text and must
    /// not be empty.
    fn verify_startup_config(&self, topo_dir: &Path) -> Result<()> {
        let Some((path, content)) = self.base.read_startup_config(topo_dir)? else {
            return Ok(());
        };

        if Self::startup_is_json(&path) {
            let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
                NodeError::startup_config(self.name(), format!("{}: {e}", path.display()))
            })?;
            if !value.is_object() {
                return Err(NodeError::startup_config(
                    self.name(),
                    format!("{}: expected a JSON object", path.display()),
                ));
            }
        } else if content.trim().is_empty() {
            return Err(NodeError::startup_config(
                self.name(),
                format!("{} is empty", path.display()),
            ));
        }
        Ok(())
    }

    fn container_spec(&self) -> ContainerSpec {
        let mut spec = self
            .base
            .container_spec(KIND)
            .privileged(true)
            .with_env("SRLINUX", "1");

        if spec.cmd.is_none() {
            spec.cmd = Some(vec![
                "sudo".to_string(),
                "bash".to_string(),
                "-c".to_string(),
                "touch /.dockerenv && /opt/srlinux/bin/sr_linux".to_string(),
            ]);
        }
        if let Some(path) = &self.config().startup_config {
            let target = if Self::startup_is_json(path) {
                JSON_CONFIG_TARGET
            } else {
                CLI_CONFIG_TARGET
            };
            spec.binds.push(self.base.bind(path, target));
        }
        spec
    }

    /// Wait for the management server, then load a CLI startup config.
    async fn post_deploy(&self) -> Result<()> {
        self.wait_ready().await?;

        let Some(path) = &self.config().startup_config else {
            return Ok(());
        };
        if Self::startup_is_json(path) {
            return Ok(());
        }

        let script = format!("sr_cli -ed --post 'commit save' < {CLI_CONFIG_TARGET}");
        let load = ExecCmd::new(["bash", "-c", script.as_str()])
            .map_err(|e| NodeError::execution(self.name(), "sr_cli", e.to_string()))?;
        self.base.run_checked(&load).await?;

        info!(node = %self.name(), "CLI startup config applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_push::session::recording::RecordingConnector;
    use runtime::fake::FakeCall;
    use runtime::{ContainerRuntime, FakeRuntime};

    fn ctx(runtime: Arc<FakeRuntime>, dir: &Path) -> Arc<NodeContext> {
        Arc::new(
            NodeContext::new("lab", runtime, Arc::new(RecordingConnector::new()))
                .with_topology_dir(dir),
        )
    }

    #[test]
    fn test_srl_interface_names() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(Arc::new(FakeRuntime::new()), dir.path());

        let node = |iface: &str| {
            SrlNode::new(
                NodeConfig::new("s1", KIND, "srlinux").with_interface(iface),
                ctx.clone(),
            )
        };
        assert!(node("e1-1").check_interface_name().is_ok());

        let bad = node("eth1");
        assert!(matches!(
            bad.check_interface_name(),
            Err(NodeError::InterfaceName { .. })
        ));
    }

    #[test]
    fn test_srl_startup_config_plausibility() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.json"), r#"{"srl_nokia-system:system":{}}"#).unwrap();
        std::fs::write(dir.path().join("bad.json"), "set / system").unwrap();
        std::fs::write(dir.path().join("list.json"), "[1,2]").unwrap();
        std::fs::write(dir.path().join("conf.cli"), "set / system name host-name s1\n").unwrap();
        std::fs::write(dir.path().join("empty.cli"), "\n").unwrap();
        let ctx = ctx(Arc::new(FakeRuntime::new()), dir.path());

        let check = |file: &str| {
            SrlNode::new(
                NodeConfig::new("s1", KIND, "srlinux").with_startup_config(file),
                ctx.clone(),
            )
            .verify_startup_config(dir.path())
        };

        assert!(check("good.json").is_ok());
        assert!(check("conf.cli").is_ok());
        assert!(check("bad.json").is_err());
        assert!(check("list.json").is_err());
        assert!(check("empty.cli").is_err());
        assert!(check("missing.json").is_err());
    }

    #[test]
    fn test_srl_container_spec_binds_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(Arc::new(FakeRuntime::new()), dir.path());
        let node = SrlNode::new(
            NodeConfig::new("s1", KIND, "srlinux").with_startup_config("s1.json"),
            ctx,
        );

        let spec = node.container_spec();
        assert!(spec.privileged);
        assert!(spec.cmd.is_some());
        let expected = format!("{}:{JSON_CONFIG_TARGET}", dir.path().join("s1.json").display());
        assert_eq!(spec.binds, vec![expected]);
    }

    #[tokio::test]
    async fn test_srl_post_deploy_loads_cli_config() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new().with_image("srlinux"));
        let node = SrlNode::new(
            NodeConfig::new("s1", KIND, "srlinux").with_startup_config("s1.cli"),
            ctx(runtime.clone(), dir.path()),
        );
        runtime.create_and_start(&node.container_spec()).await.unwrap();

        node.post_deploy().await.unwrap();

        let execs: Vec<Vec<String>> = runtime
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                FakeCall::Exec { argv, .. } => Some(argv),
                _ => None,
            })
            .collect();
        assert_eq!(execs.len(), 2);
        assert_eq!(execs[0][0], "test");
        assert!(execs[1][2].starts_with("sr_cli"));
    }

    #[tokio::test]
    async fn test_srl_post_deploy_gives_up_when_never_ready() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(
            FakeRuntime::new()
                .with_image("srlinux")
                .with_exec_response("test", 1, ""),
        );
        let node = SrlNode::new(
            NodeConfig::new("s1", KIND, "srlinux"),
            ctx(runtime.clone(), dir.path()),
        )
        .with_readiness(3, Duration::ZERO);
        runtime.create_and_start(&node.container_spec()).await.unwrap();

        let err = node.post_deploy().await.unwrap_err();
        assert!(err.to_string().contains("not ready after 3 attempts"));
    }

    #[tokio::test]
    async fn test_srl_post_deploy_without_container() {
        let dir = tempfile::tempdir().unwrap();
        let node = SrlNode::new(
            NodeConfig::new("s1", KIND, "srlinux"),
            ctx(Arc::new(FakeRuntime::new()), dir.path()),
        );
        assert!(matches!(
            node.post_deploy().await,
            Err(NodeError::NotRunning(_))
        ));
    }
}
