//! Podman backend driving the `podman` CLI.

use async_trait::async_trait;
use netlab_core::{ExecCmd, ExecResult, OutputBuffer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, RuntimeError};
use crate::traits::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerState, GenericContainer,
};

/// `podman exec` exit status when podman itself failed before running anything.
const PODMAN_EXEC_ERROR: i64 = 125;

pub struct PodmanRuntime {
    binary: String,
    url: Option<String>,
}

/// One entry of `podman ps --format json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsEntry {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pid: u32,
}

impl From<PsEntry> for GenericContainer {
    fn from(entry: PsEntry) -> Self {
        let name = entry.names.into_iter().next().unwrap_or_default();
        GenericContainer::new(
            entry.id,
            name,
            entry.image,
            ContainerState::from_status(&entry.state),
        )
        .with_labels(entry.labels.unwrap_or_default())
        .with_pid(entry.pid)
    }
}

impl PodmanRuntime {
    /// `url` is passed as `--url` for remote podman services.
    pub fn new(url: Option<String>) -> Self {
        Self {
            binary: "podman".to_string(),
            url,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(url) = &self.url {
            cmd.arg("--url").arg(url);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run_podman(&self, args: &[String]) -> Result<String> {
        debug!("Running {} {:?}", self.binary, args);

        let output = self.command().args(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::CommandFailed(format!(
                "{} {} failed: {}",
                self.binary,
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_exec(&self, container: &str, cmd: &ExecCmd) -> Result<ExecResult> {
        let mut args = vec!["exec".to_string()];
        for pair in cmd.env_pairs() {
            args.push("--env".to_string());
            args.push(pair);
        }
        if let Some(user) = cmd.user() {
            args.push("--user".to_string());
            args.push(user.to_string());
        }
        if let Some(workdir) = cmd.workdir() {
            args.push("--workdir".to_string());
            args.push(workdir.to_string());
        }
        args.push(container.to_string());
        args.extend(cmd.argv().iter().cloned());

        let mut child = self
            .command()
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (Some(out), Some(err)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(RuntimeError::CommandFailed(
                "podman exec: output pipes unavailable".to_string(),
            ));
        };
        let (stdout, stderr, status) = tokio::join!(drain(out), drain(err), child.wait());
        let (stdout, stderr, status) = (stdout?, stderr?, status?);

        let code = status.code().map(i64::from);
        if code == Some(PODMAN_EXEC_ERROR) {
            let reason = stderr.into_string();
            return Ok(ExecResult::layer_failed(cmd.argv(), reason.trim()));
        }
        Ok(ExecResult::normalize(cmd.argv(), code, stdout, stderr))
    }
}

/// Read a stream to the end, keeping at most the buffer limit.
async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> Result<OutputBuffer> {
    let mut buffer = OutputBuffer::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buffer);
        }
        buffer.push(&chunk[..n]);
    }
}

fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];
    if let Some(hostname) = &spec.hostname {
        args.push("--hostname".to_string());
        args.push(hostname.clone());
    }
    for label in spec.labels.iter().map(|(k, v)| format!("{k}={v}")) {
        args.push("--label".to_string());
        args.push(label);
    }
    for pair in spec.env_pairs() {
        args.push("--env".to_string());
        args.push(pair);
    }
    for bind in &spec.binds {
        args.push("--volume".to_string());
        args.push(bind.clone());
    }
    if spec.privileged {
        args.push("--privileged".to_string());
    }
    if let Some(mode) = &spec.network_mode {
        args.push("--network".to_string());
        args.push(mode.clone());
    }
    args.push(spec.image.clone());
    if let Some(cmd) = &spec.cmd {
        args.extend(cmd.iter().cloned());
    }
    args
}

fn parse_ps(json: &str) -> Result<Vec<GenericContainer>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<PsEntry> =
        serde_json::from_str(json).map_err(|e| RuntimeError::Parse(e.to_string()))?;
    Ok(entries.into_iter().map(GenericContainer::from).collect())
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    fn name(&self) -> &'static str {
        "podman"
    }

    async fn ping(&self) -> Result<()> {
        self.run_podman(&["version".to_string()])
            .await
            .map_err(|e| RuntimeError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let status = self
            .command()
            .args(["image", "exists", image])
            .status()
            .await?;
        if status.success() {
            debug!(image = %image, "Image already present");
            return Ok(());
        }

        info!(image = %image, "Pulling image");
        self.run_podman(&["pull".to_string(), "--quiet".to_string(), image.to_string()])
            .await
            .map_err(|e| RuntimeError::image_pull(image, e.to_string()))?;
        Ok(())
    }

    async fn get_containers(&self, filter: &ContainerFilter) -> Result<Vec<GenericContainer>> {
        let mut args = vec![
            "ps".to_string(),
            "--all".to_string(),
            "--format".to_string(),
            "json".to_string(),
        ];
        for selector in filter.label_selectors() {
            args.push("--filter".to_string());
            args.push(format!("label={selector}"));
        }
        if let Some(name) = &filter.name {
            args.push("--filter".to_string());
            args.push(format!("name=^{name}$"));
        }

        let output = self.run_podman(&args).await?;
        Ok(parse_ps(&output)?
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<GenericContainer> {
        let id = self
            .run_podman(&create_args(spec))
            .await
            .map_err(|e| RuntimeError::create(&spec.name, e.to_string()))?
            .trim()
            .to_string();

        if let Err(e) = self.run_podman(&["start".to_string(), id.clone()]).await {
            warn!(container = %spec.name, error = %e, "Start failed, removing container");
            if let Err(cleanup) = self.delete(&id).await {
                warn!(container = %spec.name, error = %cleanup, "Failed to remove container after start failure");
            }
            return Err(RuntimeError::start(&spec.name, e.to_string()));
        }

        info!(container = %spec.name, id = %id, "Container started");
        self.get_containers(&ContainerFilter::new().with_name(&spec.name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::ContainerNotFound(spec.name.clone()))
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
        self.run_podman(&[
            "rm".to_string(),
            "--force".to_string(),
            "--ignore".to_string(),
            container.to_string(),
        ])
        .await?;
        info!(container = %container, "Removed container");
        Ok(())
    }
}
