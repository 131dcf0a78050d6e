pub mod credentials;
pub mod exec;
pub mod link;
pub mod node;
pub mod phase;

pub use credentials::Credentials;
pub use exec::{ExecCmd, ExecOutcome, ExecResult, OutputBuffer, MAX_CAPTURED_OUTPUT};
pub use link::{Endpoint, Link};
pub use node::{NodeConfig, NodeRole};
pub use phase::NodePhase;
