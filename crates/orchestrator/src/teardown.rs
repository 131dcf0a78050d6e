use futures::future::join_all;
use runtime::ContainerRuntime;
use tracing::{info, warn};

use crate::error::Result;
use crate::lab::{lab_containers, node_name};

/// Remove every container of `lab`. Safe to repeat; returns the names of the
/// nodes whose containers were removed.
pub async fn destroy_lab(runtime: &dyn ContainerRuntime, lab: &str) -> Result<Vec<String>> {
    let containers = lab_containers(runtime, lab).await?;
    if containers.is_empty() {
        info!(lab = %lab, "No containers to remove");
        return Ok(Vec::new());
    }

    let removals = containers.iter().map(|container| async move {
        let outcome = runtime.delete(&container.id).await;
        (node_name(container).to_string(), outcome)
    });

    let mut removed = Vec::new();
    let mut first_error = None;
    for (node, outcome) in join_all(removals).await {
        match outcome {
            Ok(()) => removed.push(node),
            Err(e) => {
                warn!(lab = %lab, node = %node, error = %e, "Failed to remove container");
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e.into());
    }
    info!(lab = %lab, removed = removed.len(), "Lab destroyed");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{ContainerSpec, FakeRuntime, LABEL_LAB, LABEL_NODE};

    #[tokio::test]
    async fn test_destroy_is_idempotent_and_scoped() {
        let runtime = FakeRuntime::new().with_image("alpine:3");
        for (lab, node) in [("lab1", "r1"), ("lab1", "r2"), ("lab2", "r1")] {
            let spec = ContainerSpec::new(format!("clab-{lab}-{node}"), "alpine:3")
                .with_label(LABEL_LAB, lab)
                .with_label(LABEL_NODE, node);
            runtime.create_and_start(&spec).await.unwrap();
        }

        let removed = destroy_lab(&runtime, "lab1").await.unwrap();
        assert_eq!(removed, vec!["r1", "r2"]);
        assert_eq!(runtime.containers().len(), 1);

        let again = destroy_lab(&runtime, "lab1").await.unwrap();
        assert!(again.is_empty());
        assert_eq!(runtime.containers()[0].name, "clab-lab2-r1");
    }
}
