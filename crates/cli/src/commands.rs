use anyhow::{Context, Result};
use colored::Colorize;
use events::{Event, EventBus, EventEnvelope};
use netlab_core::{ExecCmd, ExecResult, NodePhase};
use nodes::config_push::SshConnector;
use orchestrator::{DeploySummary, Deployer, OrchestratorError};
use runtime::{ContainerRuntime, ContainerState, LABEL_KIND};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::config::NetlabConfig;
use crate::topology_file;

pub async fn deploy(config: &NetlabConfig, topology: &Path) -> Result<ExitCode> {
    let topology = topology_file::load(topology)?;
    let runtime = connect(config)?;

    let bus = EventBus::new();
    let printer = tokio::spawn(print_progress(bus.subscribe()));

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Interrupted, cancelling deployment...".yellow());
                cancel.cancel();
            }
        }
    });

    let deployer = Deployer::new(runtime, Arc::new(SshConnector::new()), bus)
        .with_config(config.deployer_config());
    let outcome = deployer.deploy(&topology, cancel).await;
    interrupt.abort();

    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            printer.abort();
            return Err(e).with_context(|| format!("Deployment of lab {} failed", topology.name));
        }
    };
    let _ = printer.await;

    print_summary(&summary);
    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn destroy(config: &NetlabConfig, lab: &str) -> Result<()> {
    let runtime = connect(config)?;
    let removed = orchestrator::destroy_lab(runtime.as_ref(), lab)
        .await
        .with_context(|| format!("Failed to destroy lab {lab}"))?;

    if removed.is_empty() {
        println!("Lab {} has no containers", lab.bold());
    } else {
        println!(
            "{} Removed {} node(s) of lab {}: {}",
            "✓".green(),
            removed.len(),
            lab.bold(),
            removed.join(", ")
        );
    }
    Ok(())
}

pub async fn inspect(config: &NetlabConfig, lab: &str) -> Result<()> {
    let runtime = connect(config)?;
    let containers = orchestrator::lab_containers(runtime.as_ref(), lab).await?;
    if containers.is_empty() {
        println!("Lab {} has no containers", lab.bold());
        return Ok(());
    }

    let width = containers
        .iter()
        .map(|c| orchestrator::node_name(c).len())
        .max()
        .unwrap_or(0)
        .max("NODE".len());

    println!(
        "{:<width$}  {:<8}  {:<12}  {:<10}  IMAGE",
        "NODE", "KIND", "ID", "STATE"
    );
    for container in &containers {
        let state = match container.state {
            ContainerState::Running => container.state.as_str().green(),
            ContainerState::Stopped | ContainerState::Removed => container.state.as_str().red(),
            _ => container.state.as_str().normal(),
        };
        println!(
            "{:<width$}  {:<8}  {:<12}  {:<10}  {}",
            orchestrator::node_name(container),
            container.label(LABEL_KIND).unwrap_or("-"),
            container.short_id(),
            state,
            container.image
        );
    }
    Ok(())
}

pub async fn exec(
    config: &NetlabConfig,
    lab: &str,
    node: Option<&str>,
    command: &str,
) -> Result<ExitCode> {
    let cmd = ExecCmd::from_string(command).context("Invalid command")?;
    let runtime = connect(config)?;
    let results = orchestrator::exec_in_lab(runtime.as_ref(), lab, node, &cmd).await?;

    if results.is_empty() {
        println!("No running nodes matched in lab {}", lab.bold());
        return Ok(ExitCode::FAILURE);
    }

    let mut all_ok = true;
    for (node, result) in &results {
        all_ok &= result.as_ref().is_ok_and(ExecResult::success);
        println!("{}", exec_header(node, result));
        if let Ok(result) = result {
            print_exec_output(result);
        }
    }
    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn connect(config: &NetlabConfig) -> Result<Arc<dyn ContainerRuntime>> {
    runtime::connect(&config.runtime).with_context(|| {
        format!(
            "Failed to connect to {} runtime",
            config.runtime.kind.as_str()
        )
    })
}

/// Prints node progress until the run finishes or the bus goes away.
async fn print_progress(mut rx: tokio::sync::broadcast::Receiver<EventEnvelope>) {
    loop {
        match rx.recv().await {
            Ok(envelope) => {
                let finished = matches!(envelope.event, Event::DeployFinished { .. });
                if let Some(line) = progress_line(&envelope.event) {
                    println!("{line}");
                }
                if finished {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Progress printer lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn progress_line(event: &Event) -> Option<String> {
    match event {
        Event::DeployStarted { lab, nodes } => Some(format!(
            "Deploying lab {} ({} nodes)",
            lab.bold(),
            nodes
        )),
        Event::NodePhaseChanged {
            node,
            to_phase,
            error,
            ..
        } => {
            let phase = match NodePhase::parse(to_phase) {
                Some(NodePhase::Ready) => to_phase.green(),
                Some(NodePhase::Failed) => to_phase.red(),
                _ => to_phase.normal(),
            };
            let detail = error
                .as_ref()
                .map(|e| format!(" [{}] {}", e.kind, e.message))
                .unwrap_or_default();
            Some(format!("  {:<16} {}{}", node, phase, detail))
        }
        Event::Error { message, .. } => Some(format!("  {} {}", "error:".red(), message)),
        Event::NodeRunning(_) | Event::DeployFinished { .. } => None,
    }
}

fn print_summary(summary: &DeploySummary) {
    println!();
    println!("{summary}");
    if summary.is_success() {
        println!("{} Lab {} is ready", "✓".green(), summary.lab.bold());
    } else {
        let failed: Vec<&str> = summary.failed().map(|r| r.node.as_str()).collect();
        println!(
            "{} Lab {} has failed nodes: {}",
            "✗".red(),
            summary.lab.bold(),
            failed.join(", ")
        );
    }
}

fn exec_header(node: &str, result: &Result<ExecResult, OrchestratorError>) -> String {
    let status = match result {
        Ok(result) => match (result.exit_code(), result.layer_failure()) {
            (Some(0), _) => "exit 0".green(),
            (Some(code), _) => format!("exit {code}").red(),
            (None, Some(reason)) => format!("not run: {reason}").red(),
            (None, None) => "no status".red(),
        },
        Err(e) => format!("error: {e}").red(),
    };
    format!("{} {} ({})", "==>".cyan(), node.bold(), status)
}

fn print_exec_output(result: &ExecResult) {
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
        if !result.stdout.ends_with('\n') {
            println!();
        }
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
        if !result.stderr.ends_with('\n') {
            eprintln!();
        }
    }
    if result.truncated {
        println!("{}", "(output truncated)".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::NodeErrorData;

    #[test]
    fn test_progress_line_includes_error() {
        colored::control::set_override(false);
        let line = progress_line(&Event::NodePhaseChanged {
            node: "r1".to_string(),
            from_phase: "host_checked".to_string(),
            to_phase: "failed".to_string(),
            error: Some(NodeErrorData {
                kind: "runtime".to_string(),
                message: "pull failed".to_string(),
            }),
        })
        .unwrap();

        assert!(line.contains("r1"));
        assert!(line.contains("failed [runtime] pull failed"));
    }

    #[test]
    fn test_exec_header_reports_backend_error() {
        colored::control::set_override(false);
        let failed: Result<ExecResult, OrchestratorError> = Err(
            runtime::RuntimeError::CommandFailed("podman exec failed".to_string()).into(),
        );
        let line = exec_header("r2", &failed);
        assert!(line.starts_with("==> r2 (error: "));
        assert!(line.contains("podman exec failed"));
    }

    #[test]
    fn test_deploy_finished_not_printed() {
        let event = Event::DeployFinished {
            lab: "lab1".to_string(),
            ready: 1,
            failed: 0,
        };
        assert!(progress_line(&event).is_none());
    }
}
