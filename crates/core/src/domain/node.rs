use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::credentials::Credentials;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Router,
    Switch,
    #[default]
    Host,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Switch => "switch",
            Self::Host => "host",
        }
    }
}

/// Desired configuration of one node, as handed over by the topology loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub role: NodeRole,
    pub image: String,
    /// Optional helper image started next to the main one.
    #[serde(default)]
    pub sidecar_image: Option<String>,
    #[serde(default)]
    pub mgmt_ipv4: Option<String>,
    /// Public keys in `authorized_keys` format.
    #[serde(default)]
    pub ssh_pub_keys: Vec<String>,
    #[serde(default)]
    pub startup_config: Option<PathBuf>,
    #[serde(default)]
    pub license: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub binds: Vec<String>,
    #[serde(default)]
    pub cmd: Option<Vec<String>>,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Interface names this node takes part in, filled from the link list.
    #[serde(default)]
    pub interfaces: Vec<String>,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            role: NodeRole::default(),
            image: image.into(),
            sidecar_image: None,
            mgmt_ipv4: None,
            ssh_pub_keys: Vec::new(),
            startup_config: None,
            license: None,
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            binds: Vec::new(),
            cmd: None,
            credentials: None,
            interfaces: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_mgmt_ipv4(mut self, addr: impl Into<String>) -> Self {
        self.mgmt_ipv4 = Some(addr.into());
        self
    }

    pub fn with_ssh_pub_keys(mut self, keys: Vec<String>) -> Self {
        self.ssh_pub_keys = keys;
        self
    }

    pub fn with_startup_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.startup_config = Some(path.into());
        self
    }

    pub fn with_license(mut self, path: impl Into<PathBuf>) -> Self {
        self.license = Some(path.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        self
    }
}
