//! Dependency-ordered deployment of lab topologies.

pub mod deployer;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod lab;
pub mod retry;
pub mod state_machine;
pub mod summary;
pub mod teardown;
pub mod topology;

pub use deployer::{Deployer, DeployerConfig};
pub use emitter::PhaseEmitter;
pub use error::{DeployError, ErrorKind, OrchestratorError, Result};
pub use graph::DependencyGraph;
pub use lab::{exec_in_lab, lab_containers, node_name};
pub use retry::RetryPolicy;
pub use state_machine::PhaseStateMachine;
pub use summary::{DeploySummary, NodeReport};
pub use teardown::destroy_lab;
pub use topology::Topology;
