//! Rendering configuration fragments from node state and pushing them over a
//! management session, outside of the container exec path.

pub mod keys;
pub mod push;
pub mod session;
pub mod template;

use std::time::Duration;
use thiserror::Error;

pub use keys::{classify, parse_authorized_keys, KeySlots, PublicKey, SrosTemplateData};
pub use push::ConfigPusher;
pub use session::{ManagementSession, SessionConnector, SshConnector};
pub use template::TemplateRenderer;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Node has no management address")]
    NoManagementAddress,

    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("Authentication as {user} rejected by {addr}")]
    Authentication { addr: String, user: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Session timed out after {0:?}")]
    Timeout(Duration),

    #[error("Device rejected configuration: {0}")]
    Rejected(String),
}

impl PushError {
    pub fn connect(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Errors worth another connection attempt while the device is still booting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Timeout(_))
    }
}

impl From<russh::Error> for PushError {
    fn from(err: russh::Error) -> Self {
        Self::Session(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PushError>;
