//! Drives every node of a topology through its lifecycle.
//!
//! One task per node. A node first runs its local preflight checks, then waits
//! until each of its dependencies has reached Running (or failed), then takes
//! a concurrency slot and runs its phases serially. Every phase is raced against the node's cancellation token
//! and the per-phase deadline.

use events::EventBus;
use netlab_core::{Credentials, NodePhase};
use nodes::config_push::SessionConnector;
use nodes::{HostFacts, Node, NodeContext, NodeError, NodeRegistry};
use runtime::{ContainerRuntime, GenericContainer, RuntimeError};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::emitter::PhaseEmitter;
use crate::error::{DeployError, ErrorKind, Result};
use crate::retry::RetryPolicy;
use crate::state_machine::PhaseStateMachine;
use crate::summary::{DeploySummary, NodeReport};
use crate::topology::Topology;

const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct DeployerConfig {
    /// Leading part of container names.
    pub prefix: String,
    pub max_concurrency: usize,
    pub phase_timeout: Duration,
    pub retry: RetryPolicy,
    pub default_credentials: Credentials,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            prefix: "clab".to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            phase_timeout: DEFAULT_PHASE_TIMEOUT,
            retry: RetryPolicy::default(),
            default_credentials: Credentials::default(),
        }
    }
}

impl DeployerConfig {
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_credentials(mut self, credentials: Credentials) -> Self {
        self.default_credentials = credentials;
        self
    }
}

pub struct Deployer {
    runtime: Arc<dyn ContainerRuntime>,
    connector: Arc<dyn SessionConnector>,
    registry: NodeRegistry,
    bus: EventBus,
    config: DeployerConfig,
    host: Option<HostFacts>,
}

impl Deployer {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        connector: Arc<dyn SessionConnector>,
        bus: EventBus,
    ) -> Self {
        Self {
            runtime,
            connector,
            registry: NodeRegistry::with_builtin_kinds(),
            bus,
            config: DeployerConfig::default(),
            host: None,
        }
    }

    pub fn with_registry(mut self, registry: NodeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: DeployerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use these facts instead of reading `/proc` at deploy time.
    pub fn with_host_facts(mut self, host: HostFacts) -> Self {
        self.host = Some(host);
        self
    }

    pub fn config(&self) -> &DeployerConfig {
        &self.config
    }

    fn context(&self, topology: &Topology) -> Arc<NodeContext> {
        let host = self.host.clone().unwrap_or_else(HostFacts::gather);
        Arc::new(
            NodeContext::new(
                &topology.name,
                Arc::clone(&self.runtime),
                Arc::clone(&self.connector),
            )
            .with_prefix(&self.config.prefix)
            .with_topology_dir(&topology.dir)
            .with_default_credentials(self.config.default_credentials.clone())
            .with_host_facts(host),
        )
    }

    /// Deploy every node of `topology`.
    ///
    /// Fails before any node is touched when the link graph references unknown
    /// nodes or has a cycle, or a node has an unknown kind. Per-node failures
    /// are reported in the summary instead.
    pub async fn deploy(
        &self,
        topology: &Topology,
        cancel: CancellationToken,
    ) -> Result<DeploySummary> {
        let started = Instant::now();
        let graph = topology.graph()?;
        graph.check_acyclic()?;

        let ctx = self.context(topology);
        let nodes = topology
            .resolved_nodes()
            .into_iter()
            .map(|config| self.registry.build(config, Arc::clone(&ctx)))
            .collect::<std::result::Result<Vec<_>, NodeError>>()?;

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for node in &nodes {
            let (tx, rx) = watch::channel(NodePhase::Pending);
            senders.insert(node.name().to_string(), tx);
            receivers.insert(node.name().to_string(), rx);
        }

        let emitter = PhaseEmitter::new(&topology.name, self.bus.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        info!(
            lab = %topology.name,
            nodes = nodes.len(),
            max_concurrency = self.config.max_concurrency,
            "Starting deployment"
        );
        emitter.deploy_started(nodes.len());

        let mut handles = Vec::with_capacity(nodes.len());
        for node in nodes {
            let name = node.name().to_string();
            let Some(phase_tx) = senders.remove(&name) else {
                continue;
            };
            let dependencies = graph
                .dependencies(&name)
                .filter_map(|dep| receivers.get(dep).map(|rx| (dep.to_string(), rx.clone())))
                .collect();

            let task = NodeTask {
                kind: node.kind(),
                node,
                phase: NodePhase::Pending,
                phase_tx,
                dependencies,
                semaphore: Arc::clone(&semaphore),
                cancel: cancel.child_token(),
                emitter: emitter.clone(),
                retry: self.config.retry,
                phase_timeout: self.config.phase_timeout,
                topology_dir: topology.dir.clone(),
                container: None,
                error: None,
            };
            handles.push((name, task.kind, tokio::spawn(task.run())));
        }
        drop(receivers);

        let mut reports = Vec::with_capacity(handles.len());
        for (name, kind, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(node = %name, error = %e, "Node task aborted");
                    let mut report = NodeReport::new(&name, kind, NodePhase::Failed);
                    report.error = Some(DeployError::new(
                        &name,
                        ErrorKind::Execution,
                        NodePhase::Pending,
                        format!("node task aborted: {e}"),
                    ));
                    report
                }
            };
            reports.push(report);
        }

        let summary = DeploySummary {
            lab: topology.name.clone(),
            nodes: reports,
            elapsed: started.elapsed(),
        };
        let ready = summary.ready_count();
        emitter.deploy_finished(ready, summary.nodes.len() - ready);
        info!(
            lab = %summary.lab,
            ready,
            total = summary.nodes.len(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Deployment finished"
        );
        Ok(summary)
    }
}

/// State owned by one node's task.
struct NodeTask {
    node: Arc<dyn Node>,
    kind: &'static str,
    phase: NodePhase,
    phase_tx: watch::Sender<NodePhase>,
    dependencies: Vec<(String, watch::Receiver<NodePhase>)>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    emitter: PhaseEmitter,
    retry: RetryPolicy,
    phase_timeout: Duration,
    topology_dir: PathBuf,
    container: Option<GenericContainer>,
    error: Option<DeployError>,
}

impl NodeTask {
    async fn run(mut self) -> NodeReport {
        if let Err(err) = self.drive().await {
            self.fail(err);
        }
        NodeReport {
            node: self.node.name().to_string(),
            kind: self.kind.to_string(),
            phase: self.phase,
            container_id: self.container.map(|c| c.id),
            error: self.error,
        }
    }

    fn name(&self) -> &str {
        self.node.name()
    }

    async fn drive(&mut self) -> std::result::Result<(), DeployError> {
        // local misconfiguration is reported even when an upstream node fails
        self.preflight().await?;
        self.wait_for_dependencies().await?;

        let semaphore = Arc::clone(&self.semaphore);
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return Err(DeployError::cancelled(self.name(), self.phase, "cancelled while waiting for a slot"));
            }
            permit = semaphore.acquire_owned() => permit.map_err(|_| {
                DeployError::cancelled(self.name(), self.phase, "deployment shut down")
            })?,
        };
        debug!(node = %self.name(), "Slot acquired");

        self.advance(NodePhase::HostChecked)?;

        let node = Arc::clone(&self.node);
        let retry = self.retry;
        self.guarded(retry.run("pull_image", || node.pull_image(), NodeError::is_retryable))
            .await?;
        self.advance(NodePhase::ImagePulled)?;

        let container = self.create_container().await?;
        self.advance(NodePhase::Created)?;

        let container = self.ensure_running(container).await?;
        self.container = Some(container);
        self.advance(NodePhase::Running)?;

        self.guarded(node.post_deploy()).await?;
        self.advance(NodePhase::PostDeployed)?;
        self.advance(NodePhase::Ready)?;
        info!(node = %self.name(), kind = self.kind, "Node ready");
        Ok(())
    }

    async fn wait_for_dependencies(&mut self) -> std::result::Result<(), DeployError> {
        let name = self.node.name().to_string();
        for (peer, rx) in self.dependencies.iter_mut() {
            debug!(node = %name, dependency = %peer, "Waiting for dependency");
            loop {
                let phase = *rx.borrow_and_update();
                if phase.has_reached_running() {
                    break;
                }
                if phase == NodePhase::Failed {
                    return Err(DeployError::dependency(
                        &name,
                        format!("dependency {peer} failed"),
                    ));
                }
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return Err(DeployError::cancelled(
                            &name,
                            NodePhase::Pending,
                            format!("cancelled while waiting for {peer}"),
                        ));
                    }
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return Err(DeployError::dependency(
                                &name,
                                format!("dependency {peer} stopped before reaching running"),
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn preflight(&self) -> std::result::Result<(), DeployError> {
        let node = &self.node;
        node.verify_host_requirements()
            .and_then(|_| node.check_interface_name())
            .and_then(|_| node.verify_startup_config(&self.topology_dir))
            .map_err(|e| self.node_error(&e))?;
        self.guarded(node.verify_license_file_exists()).await
    }

    /// Remove leftovers of an earlier run, then create and start the container.
    async fn create_container(&self) -> std::result::Result<GenericContainer, DeployError> {
        let node = Arc::clone(&self.node);
        let runtime = Arc::clone(node.base().runtime());

        let leftovers = self.guarded(node.get_containers()).await?;
        for leftover in leftovers {
            warn!(node = %self.name(), container = %leftover.name, "Removing leftover container");
            self.guarded(async {
                runtime
                    .delete(&leftover.id)
                    .await
                    .map_err(|e| NodeError::runtime(node.name(), e))
            })
            .await?;
        }

        let spec = node.container_spec();
        debug!(node = %self.name(), container = %spec.name, image = %spec.image, "Creating container");
        let created = self
            .guarded(async {
                self.retry
                    .run(
                        "create_and_start",
                        || runtime.create_and_start(&spec),
                        RuntimeError::is_retryable,
                    )
                    .await
                    .map_err(|e| NodeError::runtime(node.name(), e))
            })
            .await;

        if matches!(&created, Err(e) if e.kind == ErrorKind::Cancelled) {
            self.remove_abandoned(runtime.as_ref(), &spec.name).await;
        }
        created
    }

    /// Remove a container whose creation was interrupted. Runs after
    /// cancellation, so only the phase deadline bounds it.
    async fn remove_abandoned(&self, runtime: &dyn ContainerRuntime, container: &str) {
        match tokio::time::timeout(self.phase_timeout, runtime.delete(container)).await {
            Ok(Ok(())) => {
                debug!(node = %self.name(), container = %container, "Removed interrupted container");
            }
            Ok(Err(e)) => {
                warn!(node = %self.name(), container = %container, error = %e, "Failed to remove interrupted container");
            }
            Err(_) => {
                warn!(node = %self.name(), container = %container, "Timed out removing interrupted container");
            }
        }
    }

    async fn ensure_running(
        &self,
        container: GenericContainer,
    ) -> std::result::Result<GenericContainer, DeployError> {
        if container.is_running() {
            return Ok(container);
        }
        let node = Arc::clone(&self.node);
        self.guarded(node.get_containers())
            .await?
            .into_iter()
            .find(GenericContainer::is_running)
            .ok_or_else(|| {
                DeployError::new(
                    self.name(),
                    ErrorKind::Runtime,
                    self.phase,
                    format!("container {} did not report running", container.name),
                )
            })
    }

    /// Race `fut` against cancellation and the phase deadline.
    async fn guarded<T>(
        &self,
        fut: impl Future<Output = nodes::Result<T>>,
    ) -> std::result::Result<T, DeployError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(DeployError::cancelled(self.name(), self.phase, "deployment cancelled"))
            }
            outcome = tokio::time::timeout(self.phase_timeout, fut) => match outcome {
                Ok(result) => result.map_err(|e| self.node_error(&e)),
                Err(_) => Err(DeployError::cancelled(
                    self.name(),
                    self.phase,
                    format!("phase deadline of {:?} passed", self.phase_timeout),
                )),
            },
        }
    }

    fn node_error(&self, err: &NodeError) -> DeployError {
        DeployError::from_node(self.name(), self.phase, err)
    }

    fn advance(&mut self, to: NodePhase) -> std::result::Result<(), DeployError> {
        let from = self.phase;
        PhaseStateMachine::validate_transition(&from, &to).map_err(|e| {
            DeployError::new(self.name(), ErrorKind::Execution, from, e.to_string())
        })?;

        self.phase = to;
        debug!(node = %self.name(), from = %from, to = %to, "Phase changed");
        self.emitter.phase_changed(self.node.name(), from, to, None);
        if to == NodePhase::Running {
            if let Some(container) = &self.container {
                self.emitter.node_running(self.node.name(), container);
            }
        }
        // dependents observe the new phase only after its events are out
        self.phase_tx.send_replace(to);
        Ok(())
    }

    fn fail(&mut self, err: DeployError) {
        let from = self.phase;

        if err.kind == ErrorKind::ConfigPush && from == NodePhase::Running {
            warn!(node = %self.name(), error = %err.message, "Config push failed, container left running");
            self.emitter.node_error(&err);
            self.error = Some(err);
            return;
        }

        error!(
            node = %self.name(),
            kind = %err.kind,
            phase = %from,
            error = %err.message,
            "Node failed"
        );
        if PhaseStateMachine::can_transition(&from, &NodePhase::Failed) {
            self.phase = NodePhase::Failed;
            self.emitter
                .phase_changed(self.node.name(), from, NodePhase::Failed, Some(&err));
            self.phase_tx.send_replace(NodePhase::Failed);
        }
        self.error = Some(err);
    }
}
