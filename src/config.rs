//! Config fields definitions for kubeplay simulation

use serde::Deserialize;

use crate::core::deployment::Deployment;
use crate::core::job::{AuxiliaryResource, Job};
use crate::core::node::Node;
use crate::core::scheduler::plugin::DEFAULT_FILTERS;
use crate::core::service::Service;
use crate::metrics::printer::MetricsPrinterConfig;
use crate::scenario::definition::ScenarioDefinition;

#[derive(Debug, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub sim_name: String,
    pub seed: u64,
    /// If not set default output of logs is stdout/stderr
    pub logs_filepath: Option<String>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Delay after the last scenario step before the run returns to idle.
    #[serde(default = "default_scenario_auto_stop_delay_ms")]
    pub scenario_auto_stop_delay_ms: u64,
    pub metrics_printer: Option<MetricsPrinterConfig>,
    pub default_cluster: Option<Vec<NodeGroup>>,

    // Fixture objects loaded at session start.
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub resources: Vec<AuxiliaryResource>,
    /// Merged over the built-in scenario table by name.
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
}

fn default_scenario_auto_stop_delay_ms() -> u64 {
    1500
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Filter plugin names applied in order.
    pub filters: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            filters: DEFAULT_FILTERS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

#[derive(Clone, Default, Debug, Deserialize, PartialEq)]
pub struct NodeGroup {
    // If node count is not none and node's metadata has name, then it's taken as a prefix of all nodes
    // in a group.
    // If node count is none or 1 and node's metadata has name, then it's a single node and its name is set
    // to metadata name.
    // If metadata has got no name, then prefix default_node(_<idx>)? is used.
    pub node_count: Option<u64>,
    pub node_template: Node,
}

impl NodeGroup {
    /// Materializes the group. `total_nodes` is the running index shared by all groups.
    pub fn nodes(&self, total_nodes: &mut u64) -> Vec<Node> {
        let node_count = self.node_count.unwrap_or(1);
        let template_name = &self.node_template.metadata.name;

        if node_count == 1 && !template_name.is_empty() {
            // use name prefix as-is without suffix
            return vec![self.node_template.clone()];
        }
        let name_prefix = if template_name.is_empty() {
            "default_node"
        } else {
            template_name.as_str()
        };

        (0..node_count)
            .map(|_| {
                let mut node = self.node_template.clone();
                node.metadata.name = format!("{}_{}", name_prefix, total_nodes);
                *total_nodes += 1;
                node
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeGroup, SchedulerConfig};
    use crate::core::node::Node;
    use crate::test_util::helpers::default_test_simulation_config;

    #[test]
    fn test_defaults() {
        let config = default_test_simulation_config(None);
        assert_eq!(1500, config.scenario_auto_stop_delay_ms);
        assert_eq!(SchedulerConfig::default(), config.scheduler);
        assert!(config.deployments.is_empty());
        assert!(config.scenarios.is_empty());
    }

    #[test]
    fn test_node_group_naming() {
        let mut total_nodes = 0;
        let single = NodeGroup {
            node_count: None,
            node_template: Node::new("control-plane", 2000, 2048),
        };
        let names: Vec<String> = single
            .nodes(&mut total_nodes)
            .into_iter()
            .map(|n| n.metadata.name)
            .collect();
        assert_eq!(vec!["control-plane"], names);
        assert_eq!(0, total_nodes);

        let anonymous = NodeGroup {
            node_count: Some(2),
            node_template: Node::new("", 2000, 2048),
        };
        let named = NodeGroup {
            node_count: Some(2),
            node_template: Node::new("worker", 2000, 2048),
        };
        let mut names: Vec<String> = anonymous
            .nodes(&mut total_nodes)
            .into_iter()
            .map(|n| n.metadata.name)
            .collect();
        names.extend(named.nodes(&mut total_nodes).into_iter().map(|n| n.metadata.name));
        assert_eq!(
            vec!["default_node_0", "default_node_1", "worker_2", "worker_3"],
            names
        );
    }
}
