//! Node kinds and the contract the orchestrator drives them through.

pub mod config_push;
pub mod contract;
pub mod default_node;
pub mod error;
pub mod host;
pub mod interfaces;
pub mod kinds;
pub mod registry;

pub use contract::{Node, NodeContext};
pub use default_node::DefaultNode;
pub use error::{NodeError, Result};
pub use host::{HostFacts, HostRequirements};
pub use interfaces::InterfaceRule;
pub use registry::NodeRegistry;
