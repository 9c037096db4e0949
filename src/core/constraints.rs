//! Declarative placement constraints of a workload and pure predicates evaluating them against
//! nodes and pods which are already placed.
//!
//! Every constraint is opt-in: an absent or empty constraint is satisfied by any node.

use serde::{Deserialize, Serialize};

use crate::core::cluster::ClusterSnapshot;
use crate::core::common::Labels;
use crate::core::node::{Node, TaintEffect};
use crate::core::pod::{Toleration, TolerationOperator};

/// Topology keys which mean "the same node".
pub const HOSTNAME_TOPOLOGY_KEYS: [&str; 2] = ["hostname", "kubernetes.io/hostname"];

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum NodeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: NodeSelectorOperator,
    /// Ignored by `Exists` and `DoesNotExist`.
    #[serde(default)]
    pub values: Vec<String>,
}

/// All expressions of a term must match.
#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeSelectorTerm {
    #[serde(default)]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PodAntiAffinityTerm {
    pub label_selector: Labels,
    pub topology_key: String,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlacementConstraints {
    /// Exact label match, every pair must be present on the node.
    #[serde(default)]
    pub node_selector: Option<Labels>,
    /// Required node affinity: at least one term must match.
    #[serde(default)]
    pub node_affinity: Option<Vec<NodeSelectorTerm>>,
    /// Required pod anti-affinity.
    #[serde(default)]
    pub pod_anti_affinity: Option<Vec<PodAntiAffinityTerm>>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
}

/// Every (key, value) of the selector is present in labels. Empty selector matches everything.
pub fn selector_matches(selector: &Labels, labels: &Labels) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

pub fn matches_node_selector(node: &Node, selector: &Labels) -> bool {
    selector_matches(selector, &node.metadata.labels)
}

fn matches_requirement(node: &Node, requirement: &NodeSelectorRequirement) -> bool {
    let label = node.metadata.labels.get(&requirement.key);
    match requirement.operator {
        NodeSelectorOperator::In => label.map_or(false, |value| requirement.values.contains(value)),
        NodeSelectorOperator::NotIn => label.map_or(true, |value| !requirement.values.contains(value)),
        NodeSelectorOperator::Exists => label.is_some(),
        NodeSelectorOperator::DoesNotExist => label.is_none(),
    }
}

/// OR across terms, AND across expressions of a term. No terms means unconstrained.
pub fn matches_node_affinity(node: &Node, required_terms: &[NodeSelectorTerm]) -> bool {
    if required_terms.is_empty() {
        return true;
    }
    required_terms.iter().any(|term| {
        term.match_expressions
            .iter()
            .all(|requirement| matches_requirement(node, requirement))
    })
}

fn in_same_topology(candidate: &Node, other: &Node, topology_key: &str) -> bool {
    if HOSTNAME_TOPOLOGY_KEYS.contains(&topology_key) {
        return candidate.metadata.name == other.metadata.name;
    }
    match (
        candidate.metadata.labels.get(topology_key),
        other.metadata.labels.get(topology_key),
    ) {
        (Some(left), Some(right)) => left == right,
        // node without the topology label belongs to no domain
        _ => false,
    }
}

/// True iff some rule selects a non-terminated pod already bound to a node which shares the rule's
/// topology domain with `candidate`. Must be evaluated against the cluster state which includes pods
/// placed earlier in the same batch.
pub fn violates_pod_anti_affinity(
    candidate: &Node,
    cluster: &ClusterSnapshot,
    rules: &[PodAntiAffinityTerm],
) -> bool {
    rules.iter().any(|rule| {
        cluster
            .pods
            .values()
            .filter(|pod| !pod.is_terminated())
            .filter(|pod| selector_matches(&rule.label_selector, &pod.metadata.labels))
            .filter_map(|pod| {
                pod.status
                    .node_name
                    .as_ref()
                    .and_then(|node_name| cluster.nodes.get(node_name))
            })
            .any(|node| in_same_topology(candidate, node, &rule.topology_key))
    })
}

fn tolerates(toleration: &Toleration, key: &str, value: &str, effect: TaintEffect) -> bool {
    if toleration.effect.map_or(false, |e| e != effect) {
        return false;
    }
    match toleration.operator {
        TolerationOperator::Exists => toleration.key.is_empty() || toleration.key == key,
        TolerationOperator::Equal => toleration.key == key && toleration.value == value,
    }
}

/// Every `NoSchedule`/`NoExecute` taint of the node is tolerated. `PreferNoSchedule` never filters.
pub fn tolerates_taints(node: &Node, tolerations: &[Toleration]) -> bool {
    node.spec
        .taints
        .iter()
        .filter(|taint| taint.effect != TaintEffect::PreferNoSchedule)
        .all(|taint| {
            tolerations
                .iter()
                .any(|t| tolerates(t, &taint.key, &taint.value, taint.effect))
        })
}
