//! Event types for the netlab event system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Monotonic sequence number assigned by the emitter (0 when unsequenced)
    #[serde(default)]
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            timestamp: Utc::now(),
            event,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

/// All possible events in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Deployment events
    /// A deployment run started
    #[serde(rename = "deploy.started")]
    DeployStarted { lab: String, nodes: usize },

    /// A deployment run finished; every node is in a terminal phase
    #[serde(rename = "deploy.finished")]
    DeployFinished {
        lab: String,
        ready: usize,
        failed: usize,
    },

    // Node events
    /// Node moved from one lifecycle phase to another
    #[serde(rename = "node.phase_changed")]
    NodePhaseChanged {
        node: String,
        from_phase: String,
        to_phase: String,
        error: Option<NodeErrorData>,
    },

    /// Node container is running and its namespace can be wired
    #[serde(rename = "node.running")]
    NodeRunning(NodeRunningData),

    // System events
    /// Generic error event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

/// Error attached to a failing phase transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeErrorData {
    /// Error kind (preflight, runtime, execution, config_push, dependency, cancelled)
    pub kind: String,
    pub message: String,
}

/// Data for the link-wiring signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunningData {
    pub node: String,
    pub container_id: String,
    pub pid: Option<u32>,
    /// Path of the network namespace, e.g. `/proc/<pid>/ns/net`
    pub netns: Option<String>,
}

impl Event {
    /// Get the node name associated with this event, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Event::NodePhaseChanged { node, .. } => Some(node),
            Event::NodeRunning(data) => Some(&data.node),
            Event::DeployStarted { .. } | Event::DeployFinished { .. } | Event::Error { .. } => {
                None
            }
        }
    }
}
