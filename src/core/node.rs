//! Type definitions for node specification and state used in the cluster repository and config.

use serde::{Deserialize, Serialize};

use crate::core::common::{ObjectMeta, RuntimeResources};

/// Taint put on a node which stopped reporting readiness.
pub const TAINT_NODE_NOT_READY: &str = "node.kubernetes.io/not-ready";

#[derive(Default, Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    ControlPlane,
    #[default]
    Worker,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub effect: TaintEffect,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeSpec {
    #[serde(default)]
    pub role: NodeRole,
    #[serde(default)]
    pub taints: Vec<Taint>,
    /// Cordoned node: running pods stay, new pods are not placed here.
    #[serde(default)]
    pub unschedulable: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum NodeConditionType {
    NodeCreated,
    NodeReady,
    // taken from https://kubernetes.io/docs/reference/node/node-status/#condition
    DiskPressure,
    MemoryPressure,
    PIDPressure,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeCondition {
    // True, False or Unknown
    pub status: String,
    pub condition_type: NodeConditionType,
    // Last event time the condition transit from one status to another.
    pub last_transition_time: f64,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeStatus {
    // Total amount of resources. Used resources are derived from pods bound to the node.
    pub capacity: RuntimeResources,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Node {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeSpec,
    pub status: NodeStatus,
}

impl Node {
    pub fn new(name: &str, cpu: u32, ram: u64) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec: Default::default(),
            status: NodeStatus {
                capacity: RuntimeResources { cpu, ram },
                conditions: Default::default(),
            },
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn update_condition(
        &mut self,
        status: String,
        condition_type: NodeConditionType,
        last_transition_time: f64,
    ) {
        let conditions = &mut self.status.conditions;
        match conditions
            .iter_mut()
            .find(|elem| elem.condition_type == condition_type)
        {
            Some(condition) => {
                if condition.status != status {
                    condition.status = status;
                    condition.last_transition_time = last_transition_time;
                }
            }
            None => {
                conditions.push(NodeCondition {
                    status,
                    condition_type,
                    last_transition_time,
                });
            }
        }
    }

    pub fn get_condition(&self, condition_type: NodeConditionType) -> Option<&NodeCondition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// A node without a NodeReady condition at all has not been reported NotReady, so it counts as ready.
    pub fn is_ready(&self) -> bool {
        self.get_condition(NodeConditionType::NodeReady)
            .map_or(true, |condition| condition.status == "True")
    }

    pub fn is_worker(&self) -> bool {
        self.spec.role == NodeRole::Worker
    }

    pub fn remove_taint(&mut self, key: &str) {
        self.spec.taints.retain(|taint| taint.key != key);
    }
}

#[cfg(test)]
mod tests {
    use super::{Node, NodeConditionType};

    #[test]
    fn test_node_readiness_follows_condition() {
        let mut node = Node::new("node_1", 4000, 8192);
        assert!(node.is_ready());

        node.update_condition("False".to_string(), NodeConditionType::NodeReady, 5.0);
        assert!(!node.is_ready());

        node.update_condition("True".to_string(), NodeConditionType::NodeReady, 7.0);
        assert!(node.is_ready());
        assert_eq!(1, node.status.conditions.len());
        assert_eq!(
            7.0,
            node.get_condition(NodeConditionType::NodeReady)
                .unwrap()
                .last_transition_time
        );
    }
}
