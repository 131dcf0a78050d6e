//! Docker Engine API backend.
//!
//! Talks to the daemon through bollard. Exec output is streamed into bounded
//! buffers; the exit status comes from a follow-up exec inspection.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use netlab_core::{ExecCmd, ExecResult, OutputBuffer};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::traits::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerState, GenericContainer,
};

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon at `endpoint` (`unix://`, `tcp://` or `http://`), or to
    /// the local default socket when none is given.
    pub fn connect(endpoint: Option<&str>, timeout_secs: u64) -> Result<Self> {
        let docker = match endpoint {
            None => Docker::connect_with_local_defaults()?,
            Some(ep) if ep.starts_with("unix://") || ep.starts_with('/') => {
                Docker::connect_with_socket(ep, timeout_secs, bollard::API_DEFAULT_VERSION)?
            }
            Some(ep) if ep.starts_with("tcp://") || ep.starts_with("http://") => {
                Docker::connect_with_http(ep, timeout_secs, bollard::API_DEFAULT_VERSION)?
            }
            Some(ep) => {
                return Err(RuntimeError::Config(format!(
                    "unsupported docker endpoint '{ep}'"
                )))
            }
        };
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    async fn image_present(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn inspect(&self, id: &str) -> Result<GenericContainer> {
        let details = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(e) if is_not_found(&e) => return Err(RuntimeError::ContainerNotFound(id.into())),
            Err(e) => return Err(e.into()),
        };

        let state = details.state.as_ref();
        let running = state.and_then(|s| s.running).unwrap_or(false);
        let container_state = if running {
            ContainerState::Running
        } else {
            match state.and_then(|s| s.status) {
                Some(ContainerStateStatusEnum::CREATED) => ContainerState::Created,
                Some(ContainerStateStatusEnum::REMOVING) => ContainerState::Removed,
                _ => ContainerState::Stopped,
            }
        };
        let pid = state.and_then(|s| s.pid).unwrap_or(0).max(0) as u32;

        let config = details.config.unwrap_or_default();
        let labels: BTreeMap<String, String> = config.labels.unwrap_or_default().into_iter().collect();
        let name = details
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();

        Ok(GenericContainer::new(
            details.id.unwrap_or_else(|| id.to_string()),
            name,
            config.image.unwrap_or_default(),
            container_state,
        )
        .with_labels(labels)
        .with_pid(pid))
    }

    async fn run_exec(&self, container: &str, cmd: &ExecCmd) -> Result<ExecResult> {
        let options = CreateExecOptions {
            cmd: Some(cmd.argv().to_vec()),
            env: Some(cmd.env_pairs()),
            user: cmd.user().map(str::to_string),
            working_dir: cmd.workdir().map(str::to_string),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = match self.docker.create_exec(container, options).await {
            Ok(exec) => exec,
            // 404: no such container, 409: container not running
            Err(BollardError::DockerResponseServerError {
                status_code: 404 | 409,
                message,
            }) => return Ok(ExecResult::layer_failed(cmd.argv(), message)),
            Err(e) => return Err(e.into()),
        };

        let mut stdout = OutputBuffer::new();
        let mut stderr = OutputBuffer::new();

        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.push(&message)
                    }
                    LogOutput::StdErr { message } => stderr.push(&message),
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        Ok(ExecResult::normalize(
            cmd.argv(),
            inspect.exit_code,
            stdout,
            stderr,
        ))
    }
}

/// Split a reference into `fromImage` and `tag`. Untagged references pull
/// `latest`; digest references carry no tag.
fn split_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    // a colon before the last slash is a registry port
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        if self.image_present(image).await? {
            debug!(image = %image, "Image already present");
            return Ok(());
        }

        info!(image = %image, "Pulling image");
        let (from_image, tag) = split_image_ref(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(image = %image, status = %status, "Pull progress");
                    }
                }
                Err(e) => return Err(RuntimeError::image_pull(image, e.to_string())),
            }
        }
        Ok(())
    }

    async fn get_containers(&self, filter: &ContainerFilter) -> Result<Vec<GenericContainer>> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if !filter.labels.is_empty() {
            filters.insert("label".to_string(), filter.label_selectors());
        }
        if let Some(name) = &filter.name {
            // docker matches names as a regex over "/name"
            filters.insert("name".to_string(), vec![format!("^/{name}$")]);
        }

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            match self.inspect(&id).await {
                Ok(container) if filter.matches(&container) => containers.push(container),
                Ok(_) => {}
                // removed between list and inspect
                Err(RuntimeError::ContainerNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(containers)
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<GenericContainer> {
        let host_config = HostConfig {
            binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
            privileged: Some(spec.privileged),
            network_mode: spec.network_mode.clone(),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: spec.hostname.clone(),
            env: Some(spec.env_pairs()),
            cmd: spec.cmd.clone(),
            labels: Some(spec.labels.clone().into_iter().collect()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::create(&spec.name, e.to_string()))?;
        for warning in &created.warnings {
            warn!(container = %spec.name, warning = %warning, "Docker create warning");
        }

        if let Err(e) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            warn!(container = %spec.name, error = %e, "Start failed, removing container");
            if let Err(cleanup) = self.delete(&created.id).await {
                warn!(container = %spec.name, error = %cleanup, "Failed to remove container after start failure");
            }
            return Err(RuntimeError::start(&spec.name, e.to_string()));
        }

        info!(container = %spec.name, id = %created.id, "Container started");
        self.inspect(&created.id).await
    }

    async fn exec(&self, container: &str, cmd: &ExecCmd) -> Result<ExecResult> {
        debug!(container = %container, cmd = %cmd.command_line(), "Executing command");

        match cmd.timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.run_exec(container, cmd))
                .await
                .map_err(|_| RuntimeError::ExecTimeout {
                    container: container.to_string(),
                    timeout,
                })?,
            None => self.run_exec(container, cmd).await,
        }
    }

    async fn delete(&self, container: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.docker.remove_container(container, Some(options)).await {
            Ok(()) => {
                info!(container = %container, "Removed container");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                debug!(container = %container, "Container already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
