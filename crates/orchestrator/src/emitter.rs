//! Publishes node lifecycle progress on the event bus.
//!
//! Every event goes through [`EventBus::emit`], so envelopes carry
//! monotonically increasing sequence numbers shared across node tasks.

use events::{Event, EventBus, EventEnvelope, NodeErrorData, NodeRunningData};
use netlab_core::NodePhase;
use runtime::GenericContainer;

use crate::error::DeployError;

#[derive(Clone)]
pub struct PhaseEmitter {
    lab: String,
    bus: EventBus,
}

impl PhaseEmitter {
    pub fn new(lab: impl Into<String>, bus: EventBus) -> Self {
        Self {
            lab: lab.into(),
            bus,
        }
    }

    pub fn phase_changed(
        &self,
        node: &str,
        from: NodePhase,
        to: NodePhase,
        error: Option<&DeployError>,
    ) -> EventEnvelope {
        self.bus.emit(Event::NodePhaseChanged {
            node: node.to_string(),
            from_phase: from.as_str().to_string(),
            to_phase: to.as_str().to_string(),
            error: error.map(|e| NodeErrorData {
                kind: e.kind.as_str().to_string(),
                message: e.message.clone(),
            }),
        })
    }

    /// Link-wiring signal: the container's namespace can now be used.
    pub fn node_running(&self, node: &str, container: &GenericContainer) -> EventEnvelope {
        self.bus.emit(Event::NodeRunning(NodeRunningData {
            node: node.to_string(),
            container_id: container.id.clone(),
            pid: container.pid,
            netns: container
                .netns
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        }))
    }

    pub fn deploy_started(&self, nodes: usize) -> EventEnvelope {
        self.bus.emit(Event::DeployStarted {
            lab: self.lab.clone(),
            nodes,
        })
    }

    pub fn deploy_finished(&self, ready: usize, failed: usize) -> EventEnvelope {
        self.bus.emit(Event::DeployFinished {
            lab: self.lab.clone(),
            ready,
            failed,
        })
    }

    /// A failure that leaves the node's phase unchanged.
    pub fn node_error(&self, error: &DeployError) -> EventEnvelope {
        self.bus.emit(Event::Error {
            message: error.to_string(),
            context: Some(format!("{}/{}", self.lab, error.node)),
        })
    }

    pub fn current_sequence(&self) -> u64 {
        self.bus.current_sequence()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use runtime::ContainerState;

    #[tokio::test]
    async fn test_phase_changed_carries_error() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let emitter = PhaseEmitter::new("lab", bus);

        let err = DeployError::new("r1", ErrorKind::Runtime, NodePhase::HostChecked, "pull failed");
        emitter.phase_changed("r1", NodePhase::HostChecked, NodePhase::Failed, Some(&err));

        let envelope = rx.recv().await.unwrap();
        match envelope.event {
            Event::NodePhaseChanged {
                node,
                from_phase,
                to_phase,
                error,
            } => {
                assert_eq!(node, "r1");
                assert_eq!(from_phase, "host_checked");
                assert_eq!(to_phase, "failed");
                let error = error.unwrap();
                assert_eq!(error.kind, "runtime");
                assert_eq!(error.message, "pull failed");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_node_running_reports_namespace() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let emitter = PhaseEmitter::new("lab", bus);

        let container =
            GenericContainer::new("abc", "clab-lab-r1", "alpine:3", ContainerState::Running)
                .with_pid(42);
        emitter.node_running("r1", &container);

        match rx.recv().await.unwrap().event {
            Event::NodeRunning(data) => {
                assert_eq!(data.container_id, "abc");
                assert_eq!(data.pid, Some(42));
                assert_eq!(data.netns.as_deref(), Some("/proc/42/ns/net"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_clones_share_sequence() {
        let emitter1 = PhaseEmitter::new("lab", EventBus::new());
        let emitter2 = emitter1.clone();

        emitter1.deploy_started(2);
        emitter2.deploy_finished(2, 0);
        assert_eq!(emitter1.current_sequence(), 2);
        assert_eq!(emitter2.current_sequence(), 2);
    }
}
