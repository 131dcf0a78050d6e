//! Runtime-independent description of an in-container command and its result.
//!
//! Backends differ in how they report a command that could not be started at all
//! (missing binary, stopped container, refused exec). [`ExecResult::normalize`] folds
//! those cases into [`ExecOutcome::LayerFailed`] so callers never mistake them for a
//! command that ran and exited non-zero.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Upper bound on captured bytes per output stream.
pub const MAX_CAPTURED_OUTPUT: usize = 1024 * 1024;

/// Messages OCI runtimes print when the exec itself could not be started.
const EXEC_LAYER_MARKERS: &[&str] = &[
    "OCI runtime exec failed",
    "executable file not found",
    "no such file or directory",
    "is not running",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExecCmd")]
pub struct ExecCmd {
    argv: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    user: Option<String>,
    workdir: Option<String>,
    target: Option<String>,
}

/// Wire form of [`ExecCmd`]; converted through [`ExecCmd::new`] so a decoded
/// command is never empty.
#[derive(Deserialize)]
struct RawExecCmd {
    argv: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    timeout: Option<Duration>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    workdir: Option<String>,
    #[serde(default)]
    target: Option<String>,
}

impl TryFrom<RawExecCmd> for ExecCmd {
    type Error = CoreError;

    fn try_from(raw: RawExecCmd) -> Result<Self> {
        let mut cmd = Self::new(raw.argv)?;
        cmd.env = raw.env;
        cmd.timeout = raw.timeout;
        cmd.user = raw.user;
        cmd.workdir = raw.workdir;
        cmd.target = raw.target;
        Ok(cmd)
    }
}

impl ExecCmd {
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(CoreError::InvalidCommand("empty command".to_string()));
        }

        Ok(Self {
            argv,
            env: BTreeMap::new(),
            timeout: None,
            user: None,
            workdir: None,
            target: None,
        })
    }

    /// Split a shell-like command line (quotes honored, no expansion).
    pub fn from_string(cmd: &str) -> Result<Self> {
        let argv = shlex::split(cmd)
            .ok_or_else(|| CoreError::InvalidCommand(format!("unbalanced quotes in {cmd:?}")))?;
        Self::new(argv)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// A copy of this command aimed at the given container.
    pub fn targeted(&self, target: impl Into<String>) -> Self {
        let mut cmd = self.clone();
        cmd.target = Some(target.into());
        cmd
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn workdir(&self) -> Option<&str> {
        self.workdir.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// Bounded byte sink for a captured output stream.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_CAPTURED_OUTPUT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.buf.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&[u8]> for OutputBuffer {
    fn from(bytes: &[u8]) -> Self {
        let mut buf = Self::new();
        buf.push(bytes);
        buf
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecOutcome {
    /// The command ran and exited with this code.
    Exited { code: i32 },
    /// The command could not be run; there is no exit code.
    LayerFailed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub argv: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub outcome: ExecOutcome,
    pub truncated: bool,
}

impl ExecResult {
    pub fn exited(argv: &[String], code: i32, stdout: OutputBuffer, stderr: OutputBuffer) -> Self {
        let truncated = stdout.is_truncated() || stderr.is_truncated();
        Self {
            argv: argv.to_vec(),
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            outcome: ExecOutcome::Exited { code },
            truncated,
        }
    }

    pub fn layer_failed(argv: &[String], reason: impl Into<String>) -> Self {
        Self {
            argv: argv.to_vec(),
            stdout: String::new(),
            stderr: String::new(),
            outcome: ExecOutcome::LayerFailed {
                reason: reason.into(),
            },
            truncated: false,
        }
    }

    /// Build a result from what a backend reported.
    ///
    /// A missing exit status, or exit 126/127 accompanied by an OCI runtime error
    /// message, means the command never ran.
    pub fn normalize(
        argv: &[String],
        exit_code: Option<i64>,
        stdout: OutputBuffer,
        stderr: OutputBuffer,
    ) -> Self {
        let Some(code) = exit_code else {
            return Self::layer_failed(argv, "runtime reported no exit status");
        };

        // out-of-range codes from a backend are reported as -1
        let result = Self::exited(argv, i32::try_from(code).unwrap_or(-1), stdout, stderr);
        if matches!(code, 126 | 127) {
            let combined = format!("{}{}", result.stdout, result.stderr);
            if EXEC_LAYER_MARKERS.iter().any(|m| combined.contains(m)) {
                return Self::layer_failed(argv, combined.trim().to_string());
            }
        }
        result
    }

    pub fn is_layer_ok(&self) -> bool {
        matches!(self.outcome, ExecOutcome::Exited { .. })
    }

    /// Exit code, only available when the command actually ran.
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ExecOutcome::Exited { code } => Some(code),
            ExecOutcome::LayerFailed { .. } => None,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == Some(0)
    }

    pub fn layer_failure(&self) -> Option<&str> {
        match &self.outcome {
            ExecOutcome::LayerFailed { reason } => Some(reason),
            ExecOutcome::Exited { .. } => None,
        }
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}
