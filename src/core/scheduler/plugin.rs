use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::core::cluster::ClusterSnapshot;
use crate::core::constraints::{
    matches_node_affinity, matches_node_selector, tolerates_taints, violates_pod_anti_affinity,
    PlacementConstraints,
};
use crate::core::node::Node;
use crate::core::pod::Pod;

/// Filters applied in this order when the config does not list any.
pub const DEFAULT_FILTERS: [&str; 7] = [
    "WorkerNode",
    "NodeReady",
    "NodeUnschedulable",
    "NodeSelector",
    "NodeAffinity",
    "TaintToleration",
    "PodAntiAffinity",
];

lazy_static! {
    pub static ref PLUGIN_REGISTRY: HashMap<&'static str, Box<dyn FilterPlugin>> = {
        HashMap::from([
            ("WorkerNode", Box::new(WorkerNode {}) as Box<dyn FilterPlugin>),
            ("NodeReady", Box::new(NodeReady {})),
            ("NodeUnschedulable", Box::new(NodeUnschedulable {})),
            ("NodeSelector", Box::new(NodeSelector {})),
            ("NodeAffinity", Box::new(NodeAffinity {})),
            ("TaintToleration", Box::new(TaintToleration {})),
            ("PodAntiAffinity", Box::new(PodAntiAffinity {})),
        ])
    };
}

pub struct FilterContext<'a> {
    pub pod: &'a Pod,
    pub placement: &'a PlacementConstraints,
    pub cluster: &'a ClusterSnapshot,
}

pub trait FilterPlugin: Send + Sync {
    fn filter<'n>(&self, ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node>;
}

// Control plane nodes never run workload pods.
pub struct WorkerNode {}
impl FilterPlugin for WorkerNode {
    fn filter<'n>(&self, _ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node> {
        nodes.into_iter().filter(|node| node.is_worker()).collect()
    }
}

pub struct NodeReady {}
impl FilterPlugin for NodeReady {
    fn filter<'n>(&self, _ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node> {
        nodes.into_iter().filter(|node| node.is_ready()).collect()
    }
}

// Skips cordoned nodes.
pub struct NodeUnschedulable {}
impl FilterPlugin for NodeUnschedulable {
    fn filter<'n>(&self, _ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node> {
        nodes
            .into_iter()
            .filter(|node| !node.spec.unschedulable)
            .collect()
    }
}

pub struct NodeSelector {}
impl FilterPlugin for NodeSelector {
    fn filter<'n>(&self, ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node> {
        match &ctx.placement.node_selector {
            Some(selector) => nodes
                .into_iter()
                .filter(|node| matches_node_selector(node, selector))
                .collect(),
            None => nodes,
        }
    }
}

pub struct NodeAffinity {}
impl FilterPlugin for NodeAffinity {
    fn filter<'n>(&self, ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node> {
        match &ctx.placement.node_affinity {
            Some(terms) => nodes
                .into_iter()
                .filter(|node| matches_node_affinity(node, terms))
                .collect(),
            None => nodes,
        }
    }
}

pub struct TaintToleration {}
impl FilterPlugin for TaintToleration {
    fn filter<'n>(&self, ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node> {
        nodes
            .into_iter()
            .filter(|node| tolerates_taints(node, &ctx.placement.tolerations))
            .collect()
    }
}

// Evaluated against the cluster which already holds pods placed earlier in the same batch.
pub struct PodAntiAffinity {}
impl FilterPlugin for PodAntiAffinity {
    fn filter<'n>(&self, ctx: &FilterContext, nodes: Vec<&'n Node>) -> Vec<&'n Node> {
        match &ctx.placement.pod_anti_affinity {
            Some(rules) => nodes
                .into_iter()
                .filter(|node| !violates_pod_anti_affinity(node, ctx.cluster, rules))
                .collect(),
            None => nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FilterContext, DEFAULT_FILTERS, PLUGIN_REGISTRY};
    use crate::core::cluster::ClusterSnapshot;
    use crate::core::constraints::PlacementConstraints;
    use crate::core::node::{Node, NodeConditionType, NodeRole};
    use crate::core::pod::Pod;

    #[test]
    fn test_every_default_filter_is_registered() {
        for name in DEFAULT_FILTERS {
            assert!(PLUGIN_REGISTRY.contains_key(name), "{} is missing", name);
        }
    }

    #[test]
    fn test_node_state_filters() {
        let mut cluster = ClusterSnapshot::default();
        let mut control_plane = Node::new("control_plane", 1000, 1024);
        control_plane.spec.role = NodeRole::ControlPlane;
        let mut not_ready = Node::new("not_ready", 1000, 1024);
        not_ready.update_condition("False".to_string(), NodeConditionType::NodeReady, 0.0);
        let mut cordoned = Node::new("cordoned", 1000, 1024);
        cordoned.spec.unschedulable = true;
        for node in [control_plane, not_ready, cordoned, Node::new("ok", 1000, 1024)] {
            cluster.nodes.insert(node.metadata.name.clone(), node);
        }

        let pod = Pod::new("pod", 100, 100);
        let placement = PlacementConstraints::default();
        let ctx = FilterContext {
            pod: &pod,
            placement: &placement,
            cluster: &cluster,
        };
        let mut nodes: Vec<&Node> = cluster.nodes.values().collect();
        for name in ["WorkerNode", "NodeReady", "NodeUnschedulable"] {
            nodes = PLUGIN_REGISTRY[name].filter(&ctx, nodes);
        }
        assert_eq!(1, nodes.len());
        assert_eq!("ok", nodes[0].metadata.name);
    }
}
