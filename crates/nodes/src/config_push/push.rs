use netlab_core::Credentials;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::session::{ManagementSession, SessionConnector};
use super::template::TemplateRenderer;
use super::{PushError, Result};

/// Prefixes SR OS and similar CLIs print when a line is refused.
const REJECTION_MARKERS: &[&str] = &["MINOR:", "MAJOR:", "CRITICAL:", "Error:"];

/// Renders a fragment and applies it over a management session.
///
/// Rendering happens before any connection is made, so a template failure never
/// leaves a half-applied configuration on the device.
pub struct ConfigPusher {
    connector: Arc<dyn SessionConnector>,
    renderer: TemplateRenderer,
    connect_attempts: u32,
    retry_delay: Duration,
}

impl ConfigPusher {
    pub fn new(connector: Arc<dyn SessionConnector>) -> Result<Self> {
        Ok(Self {
            connector,
            renderer: TemplateRenderer::from_embedded()?,
            connect_attempts: 1,
            retry_delay: Duration::from_secs(5),
        })
    }

    /// Keep reconnecting while the device is still booting.
    pub fn with_connect_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String> {
        self.renderer.render(template, data)
    }

    /// Render `template` with `data` and apply it at `addr`. Returns the device's
    /// output.
    pub async fn push<T: Serialize + Sync>(
        &self,
        addr: &str,
        credentials: &Credentials,
        template: &str,
        data: &T,
    ) -> Result<String> {
        let fragment = self.render(template, data)?;
        self.apply(addr, credentials, &fragment).await
    }

    /// Apply an already rendered fragment.
    pub async fn apply(
        &self,
        addr: &str,
        credentials: &Credentials,
        fragment: &str,
    ) -> Result<String> {
        let mut session = self.connect(addr, credentials).await?;

        let sent = session.send_config(fragment).await;
        if let Err(e) = session.close().await {
            warn!(addr = %addr, error = %e, "Failed to close management session");
        }
        let transcript = sent?;

        if let Some(line) = rejected_line(&transcript) {
            return Err(PushError::Rejected(line.to_string()));
        }
        info!(addr = %addr, bytes = fragment.len(), "Configuration applied");
        Ok(transcript)
    }

    async fn connect(
        &self,
        addr: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn ManagementSession>> {
        let mut attempt = 1;
        loop {
            match self.connector.connect(addr, credentials).await {
                Ok(session) => return Ok(session),
                Err(e) if e.is_transient() && attempt < self.connect_attempts => {
                    debug!(addr = %addr, attempt, error = %e, "Management session not ready, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn rejected_line(transcript: &str) -> Option<&str> {
    transcript
        .lines()
        .map(str::trim)
        .find(|line| REJECTION_MARKERS.iter().any(|m| line.starts_with(m)))
}
