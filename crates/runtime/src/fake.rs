//! In-memory runtime for tests, with failure injection and call recording.

use async_trait::async_trait;
use netlab_core::{ExecCmd, ExecResult, OutputBuffer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Result, RuntimeError};
use crate::traits::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerState, GenericContainer,
};

/// A call the fake observed, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Pull(String),
    Create { name: String, id: String },
    Start(String),
    Exec { container: String, argv: Vec<String> },
    Delete(String),
}

/// Canned result for commands whose program matches.
#[derive(Debug, Clone)]
enum ExecResponse {
    Exited {
        code: i32,
        stdout: String,
        stderr: String,
    },
    LayerFailed(String),
}

#[derive(Default)]
struct FakeState {
    images: HashSet<String>,
    containers: BTreeMap<String, GenericContainer>,
    /// image -> remaining failures (`u32::MAX` = always)
    pull_failures: HashMap<String, u32>,
    start_failures: HashSet<String>,
    exec_failures: HashSet<String>,
    exec_responses: HashMap<String, ExecResponse>,
    calls: Vec<FakeCall>,
    started_at: HashMap<String, Instant>,
    next_id: u64,
}

#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    create_delay: Option<Duration>,
    start_delay: Option<Duration>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the image is already present.
    pub fn with_image(self, image: impl Into<String>) -> Self {
        self.lock().images.insert(image.into());
        self
    }

    /// Fail the next `times` pulls of `image`.
    pub fn fail_pull(self, image: impl Into<String>, times: u32) -> Self {
        self.lock().pull_failures.insert(image.into(), times);
        self
    }

    pub fn fail_pull_always(self, image: impl Into<String>) -> Self {
        self.fail_pull(image, u32::MAX)
    }

    /// Creation succeeds, start fails, for the container with this name.
    pub fn fail_start(self, container_name: impl Into<String>) -> Self {
        self.lock().start_failures.insert(container_name.into());
        self
    }

    /// Every exec in the container with this name fails at the backend.
    pub fn fail_exec(self, container_name: impl Into<String>) -> Self {
        self.lock().exec_failures.insert(container_name.into());
        self
    }

    /// Sleep this long inside every `create_and_start`.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Sleep this long between creating a container and starting it.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn with_exec_response(
        self,
        program: impl Into<String>,
        code: i32,
        stdout: impl Into<String>,
    ) -> Self {
        self.lock().exec_responses.insert(
            program.into(),
            ExecResponse::Exited {
                code,
                stdout: stdout.into(),
                stderr: String::new(),
            },
        );
        self
    }

    /// Commands running `program` cannot be started at all.
    pub fn with_missing_program(self, program: impl Into<String>) -> Self {
        let program = program.into();
        let reason = format!("exec: \"{program}\": executable file not found in $PATH");
        self.lock()
            .exec_responses
            .insert(program, ExecResponse::LayerFailed(reason));
        self
    }

    /// Mark a container as stopped, as if its process exited.
    pub fn stop(&self, container: &str) {
        let mut state = self.lock();
        if let Some(c) = find_mut(&mut state.containers, container) {
            c.state = ContainerState::Stopped;
            c.pid = None;
            c.netns = None;
        }
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    pub fn pull_attempts(&self, image: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, FakeCall::Pull(i) if i == image))
            .count()
    }

    pub fn containers(&self) -> Vec<GenericContainer> {
        self.lock().containers.values().cloned().collect()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }

    /// When the container with this name was started.
    pub fn started_at(&self, container_name: &str) -> Option<Instant> {
        self.lock().started_at.get(container_name).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // a panicking test thread must not hide the state from other assertions
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Look a container up by id or name.
fn find<'a>(
    containers: &'a BTreeMap<String, GenericContainer>,
    key: &str,
) -> Option<&'a GenericContainer> {
    containers
        .get(key)
        .or_else(|| containers.values().find(|c| c.name == key))
}

fn find_mut<'a>(
    containers: &'a mut BTreeMap<String, GenericContainer>,
    key: &str,
) -> Option<&'a mut GenericContainer> {
    let id = find(containers, key).map(|c| c.id.clone())?;
    containers.get_mut(&id)
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(FakeCall::Pull(image.to_string()));

        if let Some(remaining) = state.pull_failures.get_mut(image) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(RuntimeError::image_pull(image, "injected pull failure"));
            }
        }

        state.images.insert(image.to_string());
        Ok(())
    }

    async fn get_containers(&self, filter: &ContainerFilter) -> Result<Vec<GenericContainer>> {
        Ok(self
            .lock()
            .containers
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<GenericContainer> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }

        let (id, pid) = {
            let mut state = self.lock();
            if !state.images.contains(&spec.image) {
                return Err(RuntimeError::create(
                    &spec.name,
                    format!("image {} not present", spec.image),
                ));
            }
            if find(&state.containers, &spec.name).is_some() {
                return Err(RuntimeError::create(&spec.name, "name already in use"));
            }

            state.next_id += 1;
            let id = format!("{:012x}", state.next_id);
            let pid = 1000 + state.next_id as u32;
            let created =
                GenericContainer::new(id.clone(), &spec.name, &spec.image, ContainerState::Created)
                    .with_labels(spec.labels.clone());
            state.containers.insert(id.clone(), created);
            state.calls.push(FakeCall::Create {
                name: spec.name.clone(),
                id: id.clone(),
            });
            (id, pid)
        };

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        let start_fails = {
            let mut state = self.lock();
            state.calls.push(FakeCall::Start(id.clone()));
            state.start_failures.contains(&spec.name)
        };
        if start_fails {
            self.delete(&id).await?;
            return Err(RuntimeError::start(&spec.name, "injected start failure"));
        }

        let mut state = self.lock();
        let Some(created) = state.containers.remove(&id) else {
            return Err(RuntimeError::start(&spec.name, "container removed before start"));
        };
        let mut container = created.with_pid(pid);
        container.state = ContainerState::Running;
        state.containers.insert(id, container.clone());
        state.started_at.insert(spec.name.clone(), Instant::now());
        Ok(container)
    }

    async fn exec(&self, container: &str, cmd: &ExecCmd) -> Result<ExecResult> {
        let mut state = self.lock();
        state.calls.push(FakeCall::Exec {
            container: container.to_string(),
            argv: cmd.argv().to_vec(),
        });

        let Some(target) = find(&state.containers, container) else {
            return Ok(ExecResult::layer_failed(
                cmd.argv(),
                format!("no such container: {container}"),
            ));
        };
        if !target.is_running() {
            return Ok(ExecResult::layer_failed(
                cmd.argv(),
                format!("container {container} is not running"),
            ));
        }
        if state.exec_failures.contains(&target.name) {
            return Err(RuntimeError::CommandFailed(format!(
                "injected exec failure in {}",
                target.name
            )));
        }

        let result = match state.exec_responses.get(cmd.program()) {
            Some(ExecResponse::LayerFailed(reason)) => {
                ExecResult::layer_failed(cmd.argv(), reason.clone())
            }
            Some(ExecResponse::Exited {
                code,
                stdout,
                stderr,
            }) => ExecResult::exited(
                cmd.argv(),
                *code,
                OutputBuffer::from(stdout.as_bytes()),
                OutputBuffer::from(stderr.as_bytes()),
            ),
            None => ExecResult::exited(cmd.argv(), 0, OutputBuffer::new(), OutputBuffer::new()),
        };
        Ok(result)
    }

    async fn delete(&self, container: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(FakeCall::Delete(container.to_string()));
        if let Some(id) = find(&state.containers, container).map(|c| c.id.clone()) {
            state.containers.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LABEL_LAB;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec::new(name, "alpine:3").with_label(LABEL_LAB, "lab")
    }

    #[tokio::test]
    async fn test_pull_is_idempotent() {
        let runtime = FakeRuntime::new();
        runtime.pull_image("alpine:3").await.unwrap();
        runtime.pull_image("alpine:3").await.unwrap();
        assert!(runtime.has_image("alpine:3"));
    }

    #[tokio::test]
    async fn test_pull_failure_injection_counts_down() {
        let runtime = FakeRuntime::new().fail_pull("alpine:3", 2);

        assert!(runtime.pull_image("alpine:3").await.is_err());
        assert!(runtime.pull_image("alpine:3").await.is_err());
        assert!(runtime.pull_image("alpine:3").await.is_ok());
        assert_eq!(runtime.pull_attempts("alpine:3"), 3);
    }

    #[tokio::test]
    async fn test_delete_twice_is_ok() {
        let runtime = FakeRuntime::new().with_image("alpine:3");
        let c = runtime.create_and_start(&spec("r1")).await.unwrap();

        runtime.delete(&c.id).await.unwrap();
        runtime.delete(&c.id).await.unwrap();
        assert!(runtime.containers().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_leaves_no_container() {
        let runtime = FakeRuntime::new().with_image("alpine:3").fail_start("r1");

        let result = runtime.create_and_start(&spec("r1")).await;
        assert!(matches!(result, Err(RuntimeError::Start { .. })));

        let calls = runtime.calls();
        let created = calls
            .iter()
            .find_map(|c| match c {
                FakeCall::Create { name, id } if name == "r1" => Some(id.clone()),
                _ => None,
            })
            .unwrap();
        assert!(calls.contains(&FakeCall::Delete(created)));
        assert!(runtime.containers().is_empty());
        assert!(runtime
            .get_containers(&ContainerFilter::lab("lab"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_exists_before_start() {
        let runtime = std::sync::Arc::new(
            FakeRuntime::new()
                .with_image("alpine:3")
                .with_start_delay(Duration::from_millis(50)),
        );
        let starting = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.create_and_start(&spec("r1")).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let listed = runtime.containers();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, ContainerState::Created);
        assert!(listed[0].pid.is_none());

        let started = starting.await.unwrap().unwrap();
        assert!(started.is_running());
        assert!(started.pid.is_some());
    }

    #[tokio::test]
    async fn test_exec_distinguishes_layer_failures() {
        let runtime = FakeRuntime::new()
            .with_image("alpine:3")
            .with_exec_response("false", 1, "")
            .with_missing_program("nope");
        runtime.create_and_start(&spec("r1")).await.unwrap();

        let ran = runtime
            .exec("r1", &ExecCmd::from_string("false").unwrap())
            .await
            .unwrap();
        assert_eq!(ran.exit_code(), Some(1));

        let missing = runtime
            .exec("r1", &ExecCmd::from_string("nope").unwrap())
            .await
            .unwrap();
        assert!(!missing.is_layer_ok());

        runtime.stop("r1");
        let stopped = runtime
            .exec("r1", &ExecCmd::from_string("true").unwrap())
            .await
            .unwrap();
        assert!(stopped.layer_failure().unwrap().contains("not running"));
    }

    #[tokio::test]
    async fn test_get_containers_filters_by_lab() {
        let runtime = FakeRuntime::new().with_image("alpine:3");
        runtime.create_and_start(&spec("r1")).await.unwrap();
        runtime
            .create_and_start(&ContainerSpec::new("other", "alpine:3").with_label(LABEL_LAB, "x"))
            .await
            .unwrap();

        let found = runtime.get_containers(&ContainerFilter::lab("lab")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "r1");
        assert!(found[0].netns.is_some());
    }
}
