//! Operations on the live containers of a lab, found by label.

use futures::future::join_all;
use netlab_core::{ExecCmd, ExecResult};
use runtime::{ContainerFilter, ContainerRuntime, GenericContainer, LABEL_NODE};
use tracing::debug;

use crate::error::{OrchestratorError, Result};

/// Every container carrying the lab label, sorted by node name.
pub async fn lab_containers(
    runtime: &dyn ContainerRuntime,
    lab: &str,
) -> Result<Vec<GenericContainer>> {
    let mut containers = runtime.get_containers(&ContainerFilter::lab(lab)).await?;
    containers.sort_by(|a, b| node_name(a).cmp(node_name(b)));
    Ok(containers)
}

/// Node name from the container's labels, falling back to the container name.
pub fn node_name(container: &GenericContainer) -> &str {
    container.label(LABEL_NODE).unwrap_or(&container.name)
}

/// Run `cmd` in the running containers of `lab`, or only in `node`'s.
///
/// Only listing the containers fails the call; each node gets its own result.
pub async fn exec_in_lab(
    runtime: &dyn ContainerRuntime,
    lab: &str,
    node: Option<&str>,
    cmd: &ExecCmd,
) -> Result<Vec<(String, Result<ExecResult>)>> {
    let mut filter = ContainerFilter::lab(lab);
    if let Some(node) = node {
        filter = filter.with_label(LABEL_NODE, node);
    }
    let mut containers = runtime.get_containers(&filter).await?;
    containers.retain(GenericContainer::is_running);
    containers.sort_by(|a, b| node_name(a).cmp(node_name(b)));

    let runs = containers.iter().map(|container| async move {
        let cmd = cmd.targeted(&container.name);
        debug!(container = %container.name, cmd = %cmd.command_line(), "Running exec");
        let result = runtime
            .exec(&container.id, &cmd)
            .await
            .map_err(OrchestratorError::from);
        (node_name(container).to_string(), result)
    });

    Ok(join_all(runs).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{ContainerSpec, FakeRuntime, LABEL_LAB};

    async fn start(runtime: &FakeRuntime, lab: &str, node: &str) -> GenericContainer {
        let spec = ContainerSpec::new(format!("clab-{lab}-{node}"), "alpine:3")
            .with_label(LABEL_LAB, lab)
            .with_label(LABEL_NODE, node);
        runtime.create_and_start(&spec).await.unwrap()
    }

    #[tokio::test]
    async fn test_lab_containers_only_lists_lab() {
        let runtime = FakeRuntime::new().with_image("alpine:3");
        start(&runtime, "lab1", "r2").await;
        start(&runtime, "lab1", "r1").await;
        start(&runtime, "other", "r1").await;

        let containers = lab_containers(&runtime, "lab1").await.unwrap();
        let names: Vec<_> = containers.iter().map(node_name).collect();
        assert_eq!(names, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_exec_in_lab_skips_stopped_and_filters_node() {
        let runtime = FakeRuntime::new()
            .with_image("alpine:3")
            .with_exec_response("hostname", 0, "host\n");
        start(&runtime, "lab1", "r1").await;
        start(&runtime, "lab1", "r2").await;
        let stopped = start(&runtime, "lab1", "r3").await;
        runtime.stop(&stopped.id);

        let cmd = ExecCmd::from_string("hostname").unwrap();
        let results = exec_in_lab(&runtime, "lab1", None, &cmd).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|(_, r)| r.as_ref().is_ok_and(ExecResult::success)));

        let only = exec_in_lab(&runtime, "lab1", Some("r2"), &cmd).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].0, "r2");
    }

    #[tokio::test]
    async fn test_exec_in_lab_keeps_results_around_a_failure() {
        let runtime = FakeRuntime::new()
            .with_image("alpine:3")
            .fail_exec("clab-lab1-r2");
        for node in ["r1", "r2", "r3"] {
            start(&runtime, "lab1", node).await;
        }

        let cmd = ExecCmd::from_string("true").unwrap();
        let results = exec_in_lab(&runtime, "lab1", None, &cmd).await.unwrap();

        let nodes: Vec<_> = results.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(nodes, vec!["r1", "r2", "r3"]);
        assert!(results[0].1.as_ref().unwrap().success());
        assert!(results[1].1.is_err());
        assert!(results[2].1.as_ref().unwrap().success());
    }
}
