use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to pull image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Failed to create container {name}: {reason}")]
    Create { name: String, reason: String },

    #[error("Failed to start container {name}: {reason}")]
    Start { name: String, reason: String },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Exec in {container} timed out after {timeout:?}")]
    ExecTimeout { container: String, timeout: Duration },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RuntimeError {
    pub fn image_pull(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImagePull {
            image: image.into(),
            reason: reason.into(),
        }
    }

    pub fn create(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Create {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn start(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Start {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether repeating the same backend call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ImagePull { .. }
            | Self::Create { .. }
            | Self::Start { .. }
            | Self::BackendUnavailable(_)
            | Self::CommandFailed(_)
            | Self::Docker(_)
            | Self::Io(_) => true,
            Self::ContainerNotFound(_)
            | Self::ExecTimeout { .. }
            | Self::Parse(_)
            | Self::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
