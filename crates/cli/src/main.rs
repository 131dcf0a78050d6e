mod commands;
mod config;
mod topology_file;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::NetlabConfig;

const DEFAULT_FILTER: &str = "netlab=info,orchestrator=info,runtime=info,nodes=info";
const VERBOSE_FILTER: &str = "netlab=debug,orchestrator=debug,runtime=debug,nodes=debug";

#[derive(Parser)]
#[command(name = "netlab")]
#[command(about = "Deploy network emulation labs onto container runtimes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file; defaults to ./netlab.toml, then the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Container runtime, overrides the config file (docker, podman)
    #[arg(long, global = true)]
    runtime: Option<String>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy every node of a topology
    Deploy {
        /// Topology file
        topology: PathBuf,

        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Per-phase deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Remove every container of a lab
    Destroy {
        #[command(flatten)]
        lab: LabArgs,
    },
    /// List the containers of a lab
    Inspect {
        #[command(flatten)]
        lab: LabArgs,
    },
    /// Run a command in the running nodes of a lab
    Exec {
        #[command(flatten)]
        lab: LabArgs,

        /// Only this node
        #[arg(long)]
        node: Option<String>,

        /// Command line, split with shell quoting rules
        #[arg(long = "cmd")]
        command: String,
    },
}

#[derive(clap::Args)]
struct LabArgs {
    /// Lab name
    #[arg(short, long, required_unless_present = "topology")]
    name: Option<String>,

    /// Topology file to take the lab name from
    #[arg(short, long)]
    topology: Option<PathBuf>,
}

impl LabArgs {
    fn resolve(&self) -> Result<String> {
        if let Some(name) = &self.name {
            return Ok(name.clone());
        }
        let path = self
            .topology
            .as_deref()
            .context("Either --name or --topology is required")?;
        Ok(topology_file::load(path)?.name)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = NetlabConfig::load(cli.config.as_deref());
    if let Some(kind) = &cli.runtime {
        config.runtime.kind = runtime::RuntimeKind::parse(kind)?;
    }

    match cli.command {
        Commands::Deploy {
            topology,
            max_concurrency,
            timeout,
        } => {
            if let Some(max) = max_concurrency {
                config.deploy.max_concurrency = max;
            }
            if let Some(secs) = timeout {
                config.deploy.phase_timeout_secs = secs;
            }
            commands::deploy(&config, &topology).await
        }
        Commands::Destroy { lab } => {
            commands::destroy(&config, &lab.resolve()?).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Inspect { lab } => {
            commands::inspect(&config, &lab.resolve()?).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec { lab, node, command } => {
            commands::exec(&config, &lab.resolve()?, node.as_deref(), &command).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exec_args() {
        let cli = Cli::try_parse_from([
            "netlab", "exec", "--name", "lab1", "--node", "r1", "--cmd", "ip -br addr",
        ])
        .unwrap();
        match cli.command {
            Commands::Exec { lab, node, command } => {
                assert_eq!(lab.resolve().unwrap(), "lab1");
                assert_eq!(node.as_deref(), Some("r1"));
                assert_eq!(command, "ip -br addr");
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_lab_name_required() {
        assert!(Cli::try_parse_from(["netlab", "destroy"]).is_err());
    }
}
