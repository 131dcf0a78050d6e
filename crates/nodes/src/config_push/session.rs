use async_trait::async_trait;
use netlab_core::Credentials;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{PushError, Result};

const SSH_PORT: u16 = 22;
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// An open management session to one device.
#[async_trait]
pub trait ManagementSession: Send {
    /// Send a configuration fragment and return what the device printed back.
    async fn send_config(&mut self, config: &str) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens management sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        addr: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn ManagementSession>>;
}

/// Password-authenticated SSH with an interactive shell.
#[derive(Debug, Clone)]
pub struct SshConnector {
    port: u16,
    timeout: Duration,
}

impl SshConnector {
    pub fn new() -> Self {
        Self {
            port: SSH_PORT,
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Lab devices generate fresh host keys on every boot, so any key is accepted.
struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

struct SshSession {
    addr: String,
    handle: client::Handle<AcceptAnyHostKey>,
    timeout: Duration,
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(
        &self,
        addr: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn ManagementSession>> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.timeout),
            ..Default::default()
        });

        debug!(addr = %addr, port = self.port, user = %credentials.username, "Opening SSH session");
        let connecting = client::connect(config, (addr, self.port), AcceptAnyHostKey);
        let mut handle = tokio::time::timeout(self.timeout, connecting)
            .await
            .map_err(|_| PushError::Timeout(self.timeout))?
            .map_err(|e| PushError::connect(addr, e.to_string()))?;

        let authenticated = handle
            .authenticate_password(&credentials.username, &credentials.password)
            .await?;
        if !authenticated {
            return Err(PushError::Authentication {
                addr: addr.to_string(),
                user: credentials.username.clone(),
            });
        }

        info!(addr = %addr, "SSH session established");
        Ok(Box::new(SshSession {
            addr: addr.to_string(),
            handle,
            timeout: self.timeout,
        }))
    }
}

#[async_trait]
impl ManagementSession for SshSession {
    async fn send_config(&mut self, config: &str) -> Result<String> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.request_shell(true).await?;
        channel.data(config.as_bytes()).await?;
        channel.eof().await?;

        let mut transcript = Vec::new();
        let collect = async {
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => transcript.extend_from_slice(data),
                    ChannelMsg::ExtendedData { ref data, .. } => transcript.extend_from_slice(data),
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
        };
        tokio::time::timeout(self.timeout, collect)
            .await
            .map_err(|_| PushError::Timeout(self.timeout))?;

        debug!(addr = %self.addr, bytes = transcript.len(), "Configuration sent");
        Ok(String::from_utf8_lossy(&transcript).into_owned())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
pub mod recording {
    //! Session doubles that record what would have been sent.

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedPush {
        pub addr: String,
        pub username: String,
        pub config: String,
    }

    /// Accepts every connection and stores pushed fragments.
    #[derive(Default)]
    pub struct RecordingConnector {
        pushes: Arc<Mutex<Vec<RecordedPush>>>,
        /// Connection attempts that fail before one succeeds.
        failing_connects: Mutex<u32>,
        reply: String,
    }

    impl RecordingConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_connects(self, attempts: u32) -> Self {
            *self.failing_connects.lock().unwrap_or_else(|e| e.into_inner()) = attempts;
            self
        }

        /// Text the fake device prints after receiving configuration.
        pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
            self.reply = reply.into();
            self
        }

        pub fn pushes(&self) -> Vec<RecordedPush> {
            self.pushes.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    struct RecordingSession {
        addr: String,
        username: String,
        reply: String,
        pushes: Arc<Mutex<Vec<RecordedPush>>>,
    }

    #[async_trait]
    impl SessionConnector for RecordingConnector {
        async fn connect(
            &self,
            addr: &str,
            credentials: &Credentials,
        ) -> Result<Box<dyn ManagementSession>> {
            {
                let mut failing = self.failing_connects.lock().unwrap_or_else(|e| e.into_inner());
                if *failing > 0 {
                    *failing -= 1;
                    return Err(PushError::connect(addr, "connection refused"));
                }
            }
            Ok(Box::new(RecordingSession {
                addr: addr.to_string(),
                username: credentials.username.clone(),
                reply: self.reply.clone(),
                pushes: Arc::clone(&self.pushes),
            }))
        }
    }

    #[async_trait]
    impl ManagementSession for RecordingSession {
        async fn send_config(&mut self, config: &str) -> Result<String> {
            self.pushes
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(RecordedPush {
                    addr: self.addr.clone(),
                    username: self.username.clone(),
                    config: config.to_string(),
                });
            Ok(self.reply.clone())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recording::RecordingConnector;
    use super::*;

    #[test]
    fn test_ssh_connector_builder() {
        let connector = SshConnector::new()
            .with_port(2222)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(connector.port, 2222);
        assert_eq!(connector.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_recording_connector_records() {
        let connector = RecordingConnector::new().failing_connects(1);
        let creds = Credentials::new("admin", "admin");

        assert!(connector.connect("10.0.0.1", &creds).await.is_err());

        let mut session = connector.connect("10.0.0.1", &creds).await.unwrap();
        session.send_config("commit").await.unwrap();
        session.close().await.unwrap();

        let pushes = connector.pushes();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].config, "commit");
        assert_eq!(pushes[0].username, "admin");
    }
}
