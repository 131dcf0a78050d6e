use netlab_core::Credentials;
use orchestrator::{DeployerConfig, RetryPolicy};
use runtime::RuntimeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "netlab.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetlabConfig {
    pub runtime: RuntimeConfig,
    pub deploy: DeploySettings,
    pub retry: RetrySettings,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Leading part of container names; empty for `<lab>-<node>`.
    pub prefix: String,
    pub max_concurrency: usize,
    pub phase_timeout_secs: u64,
}

impl Default for DeploySettings {
    fn default() -> Self {
        let defaults = DeployerConfig::default();
        Self {
            prefix: defaults.prefix,
            max_concurrency: defaults.max_concurrency,
            phase_timeout_secs: defaults.phase_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
        }
    }
}

impl NetlabConfig {
    /// `path` if given, else `./netlab.toml`, else the user config directory.
    pub fn locate(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = path {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("netlab").join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Missing or unparsable files fall back to defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = Self::locate(path) else {
            tracing::debug!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::debug!("Config {} not readable ({}), using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn deployer_config(&self) -> DeployerConfig {
        let retry = RetryPolicy::new(self.retry.attempts).with_backoff(
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        );
        DeployerConfig::default()
            .with_prefix(&self.deploy.prefix)
            .with_max_concurrency(self.deploy.max_concurrency)
            .with_phase_timeout(Duration::from_secs(self.deploy.phase_timeout_secs))
            .with_retry(retry)
            .with_default_credentials(self.credentials.clone())
    }
}
