pub mod config;
pub mod docker;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake;
pub mod podman;
pub mod traits;

pub use config::{connect, RuntimeConfig, RuntimeKind};
pub use docker::DockerRuntime;
pub use error::{Result, RuntimeError};
#[cfg(any(test, feature = "testing"))]
pub use fake::FakeRuntime;
pub use podman::PodmanRuntime;
pub use traits::{
    ContainerFilter, ContainerRuntime, ContainerSpec, ContainerState, GenericContainer, LABEL_KIND,
    LABEL_LAB, LABEL_NODE,
};
