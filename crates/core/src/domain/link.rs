use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// One side of a link: a node name plus the interface name inside that node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    pub interface: String,
}

impl Endpoint {
    pub fn new(node: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            interface: interface.into(),
        }
    }

    /// Parse the `node:interface` short form used in topology files.
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((node, interface)) if !node.is_empty() && !interface.is_empty() => {
                Ok(Self::new(node, interface))
            }
            _ => Err(CoreError::InvalidEndpoint(s.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.interface)
    }
}

/// An ordered pair of endpoints. The `b` side is wired into the namespace of the
/// `a` side's node, so the `b` node depends on the `a` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub a: Endpoint,
    pub b: Endpoint,
}

impl Link {
    pub fn new(a: Endpoint, b: Endpoint) -> Self {
        Self { a, b }
    }

    pub fn endpoints(&self) -> [&Endpoint; 2] {
        [&self.a, &self.b]
    }

    pub fn is_loopback(&self) -> bool {
        self.a.node == self.b.node
    }
}
