use crate::core::cluster::ClusterSnapshot;
use crate::core::node::Node;
use crate::core::pod::Pod;

#[derive(Debug, PartialEq)]
pub enum ScheduleError {
    // Filters left no node for the pod.
    NoCandidateNodes,
    // Some nodes satisfy constraints, none has enough free cpu and memory.
    NoSufficientResources,
}

impl ScheduleError {
    /// Message of the Unschedulable condition and FailedScheduling event.
    pub fn message(&self, total_nodes: usize) -> String {
        match self {
            ScheduleError::NoCandidateNodes => format!(
                "0/{} nodes are available: no node satisfies the pod's placement constraints",
                total_nodes
            ),
            ScheduleError::NoSufficientResources => format!(
                "0/{} nodes are available: insufficient cpu or memory",
                total_nodes
            ),
        }
    }
}

/// Outcome of one reconcile call: where new pods went (None - left pending) and which pods were removed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub placements: Vec<(String, Option<String>)>,
    pub removals: Vec<String>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty() && self.removals.is_empty()
    }
}

// Trait which should implement any node selection policy used by the scheduler.
pub trait NodeSelectionPolicy {
    // Called once before a batch of placements, e.g. one scale up.
    fn start_batch(&mut self, worker_count: usize);

    // Picks a node with enough free resources for the pod among filtered candidates.
    // Candidates are sorted by node name, cluster already contains pods placed earlier in the batch.
    fn select_node(
        &mut self,
        pod: &Pod,
        candidates: &[&Node],
        cluster: &ClusterSnapshot,
    ) -> Result<String, ScheduleError>;
}
