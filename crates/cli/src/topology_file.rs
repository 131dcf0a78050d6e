use anyhow::{bail, Context, Result};
use netlab_core::{Credentials, Endpoint, Link, NodeConfig, NodeRole};
use orchestrator::Topology;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// On-disk lab description.
///
/// ```toml
/// name = "lab1"
///
/// [nodes.r1]
/// kind = "linux"
/// image = "alpine:3"
///
/// [[links]]
/// endpoints = ["r1:eth1", "r2:eth1"]
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyFile {
    pub name: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NodeEntry {
    pub kind: String,
    pub image: String,
    #[serde(default)]
    pub role: NodeRole,
    pub startup_config: Option<PathBuf>,
    pub license: Option<PathBuf>,
    pub mgmt_ipv4: Option<String>,
    #[serde(default)]
    pub ssh_pub_keys: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub binds: Vec<String>,
    pub cmd: Option<Vec<String>>,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkEntry {
    pub endpoints: [String; 2],
}

impl NodeEntry {
    fn into_config(self, name: &str) -> NodeConfig {
        let mut node = NodeConfig::new(name, self.kind, self.image)
            .with_role(self.role)
            .with_ssh_pub_keys(self.ssh_pub_keys);
        node.startup_config = self.startup_config;
        node.license = self.license;
        node.mgmt_ipv4 = self.mgmt_ipv4;
        node.credentials = self.credentials;
        node.env = self.env;
        node.labels = self.labels;
        node.binds = self.binds;
        node.cmd = self.cmd;
        node
    }
}

impl TopologyFile {
    pub fn parse(content: &str) -> Result<Self> {
        let file: Self = toml::from_str(content).context("Failed to parse topology")?;
        if file.name.trim().is_empty() {
            bail!("Topology name must not be empty");
        }
        Ok(file)
    }

    /// Node order follows node names; relative paths resolve against `dir`.
    pub fn into_topology(self, dir: impl Into<PathBuf>) -> Result<Topology> {
        let mut topology = Topology::new(self.name).with_dir(dir);
        for (name, entry) in self.nodes {
            topology = topology.with_node(entry.into_config(&name));
        }
        for entry in self.links {
            let [a, b] = &entry.endpoints;
            let a = Endpoint::parse(a).with_context(|| format!("Invalid link endpoint {a:?}"))?;
            let b = Endpoint::parse(b).with_context(|| format!("Invalid link endpoint {b:?}"))?;
            topology = topology.with_link(Link::new(a, b));
        }
        Ok(topology)
    }
}

pub fn load(path: &Path) -> Result<Topology> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topology {}", path.display()))?;
    let file = TopologyFile::parse(&content)
        .with_context(|| format!("Invalid topology {}", path.display()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    file.into_topology(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAB: &str = r#"
name = "lab1"

[nodes.sr1]
kind = "vr-sros"
image = "vrnetlab/vr-sros:23.10"
role = "router"
license = "license.txt"
ssh-pub-keys = ["ssh-rsa AAAA user@host"]

[nodes.sr1.credentials]
username = "admin"
password = "NokiaSros1!"

[nodes.h1]
kind = "linux"
image = "alpine:3"
env = { FOO = "bar" }
cmd = ["sleep", "infinity"]

[[links]]
endpoints = ["sr1:eth1", "h1:eth1"]
"#;

    #[test]
    fn test_parse_full_topology() {
        let topology = TopologyFile::parse(LAB)
            .unwrap()
            .into_topology("/labs/lab1")
            .unwrap();

        assert_eq!(topology.name, "lab1");
        assert_eq!(topology.dir, PathBuf::from("/labs/lab1"));
        assert_eq!(topology.nodes.len(), 2);

        let sr1 = topology.node("sr1").unwrap();
        assert_eq!(sr1.kind, "vr-sros");
        assert_eq!(sr1.role, NodeRole::Router);
        assert_eq!(sr1.license, Some(PathBuf::from("license.txt")));
        assert_eq!(sr1.ssh_pub_keys.len(), 1);
        assert_eq!(sr1.credentials.as_ref().unwrap().password, "NokiaSros1!");

        let h1 = topology.node("h1").unwrap();
        assert_eq!(h1.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(h1.cmd.as_deref(), Some(&["sleep".to_string(), "infinity".to_string()][..]));

        assert_eq!(topology.links.len(), 1);
        assert_eq!(topology.links[0].a, Endpoint::new("sr1", "eth1"));
        assert_eq!(topology.links[0].b, Endpoint::new("h1", "eth1"));
    }

    #[test]
    fn test_bad_endpoint_rejected() {
        let file = TopologyFile::parse(
            r#"
name = "lab1"
[nodes.a]
kind = "linux"
image = "alpine:3"
[[links]]
endpoints = ["a", "a:eth2"]
"#,
        )
        .unwrap();

        let err = file.into_topology(".").unwrap_err();
        assert!(err.to_string().contains("Invalid link endpoint"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = TopologyFile::parse(
            r#"
name = "lab1"
[nodes.a]
kind = "linux"
image = "alpine:3"
startup_cfg = "typo.cfg"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(TopologyFile::parse("name = \"  \"").is_err());
    }

    #[test]
    fn test_load_uses_file_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lab.toml");
        std::fs::write(&path, LAB).unwrap();

        let topology = load(&path).unwrap();
        assert_eq!(topology.dir, dir.path());
    }
}
