use netlab_core::NodePhase;

use crate::error::{OrchestratorError, Result};

pub struct PhaseStateMachine;

impl PhaseStateMachine {
    pub fn validate_transition(from: &NodePhase, to: &NodePhase) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::invalid_transition(*from, *to))
        }
    }

    fn allowed_transitions(from: &NodePhase) -> Vec<NodePhase> {
        match from {
            NodePhase::Pending => vec![NodePhase::HostChecked, NodePhase::Failed],
            NodePhase::HostChecked => vec![NodePhase::ImagePulled, NodePhase::Failed],
            NodePhase::ImagePulled => vec![NodePhase::Created, NodePhase::Failed],
            NodePhase::Created => vec![NodePhase::Running, NodePhase::Failed],
            NodePhase::Running => vec![NodePhase::PostDeployed, NodePhase::Failed],
            NodePhase::PostDeployed => vec![NodePhase::Ready, NodePhase::Failed],
            NodePhase::Ready | NodePhase::Failed => vec![],
        }
    }

    pub fn can_transition(from: &NodePhase, to: &NodePhase) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// The phase a successful step leads to.
    pub fn next_phase(current: &NodePhase) -> Option<NodePhase> {
        match current {
            NodePhase::Pending => Some(NodePhase::HostChecked),
            NodePhase::HostChecked => Some(NodePhase::ImagePulled),
            NodePhase::ImagePulled => Some(NodePhase::Created),
            NodePhase::Created => Some(NodePhase::Running),
            NodePhase::Running => Some(NodePhase::PostDeployed),
            NodePhase::PostDeployed => Some(NodePhase::Ready),
            NodePhase::Ready | NodePhase::Failed => None,
        }
    }
}
