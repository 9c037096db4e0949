use std::collections::BTreeMap;
use std::rc::Rc;

use crate::config::SimulationConfig;
use crate::core::common::{Labels, OwnerKind};
use crate::core::pod::PodPhase;
use crate::simulator::KubeplaySimulation;

pub const PLAYGROUND_CONFIG: &str = include_str!("../../fixtures/playground.yaml");

/// Base config without any fixture objects. Suffix lines must start at column 0.
pub fn default_test_simulation_config(with_suffix: Option<&str>) -> SimulationConfig {
    let mut default = "sim_name: \"test_kubeplay\"\nseed: 123\n".to_string();

    if let Some(suffix) = with_suffix {
        default.push_str(suffix);
    }

    serde_yaml::from_str::<SimulationConfig>(&default).unwrap()
}

pub fn playground_simulation() -> KubeplaySimulation {
    let config = serde_yaml::from_str::<SimulationConfig>(PLAYGROUND_CONFIG).unwrap();
    KubeplaySimulation::new(Rc::new(config))
}

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Asserts that requests of non-terminated pods never exceed node capacity.
pub fn check_capacity_invariant(sim: &KubeplaySimulation) {
    let cluster = sim.cluster();
    for node in cluster.nodes.values() {
        let used = cluster.node_usage(&node.metadata.name);
        assert!(
            used.cpu <= node.status.capacity.cpu && used.ram <= node.status.capacity.ram,
            "node {:?} is overcommitted: {:?} > {:?}",
            node.metadata.name,
            used,
            node.status.capacity
        );
    }
}

/// Running pods of the deployment grouped by node.
pub fn running_pods_per_node(sim: &KubeplaySimulation, deployment: &str) -> BTreeMap<String, usize> {
    let mut result: BTreeMap<String, usize> = Default::default();
    for pod in sim.cluster().pods.values() {
        if pod.is_owned_by(OwnerKind::Deployment, deployment) && pod.status.phase == PodPhase::Running {
            if let Some(node) = &pod.status.node_name {
                *result.entry(node.clone()).or_default() += 1;
            }
        }
    }
    result
}

/// Steps the simulation until the scenario engine returns to idle or no events are left.
pub fn run_until_scenario_idle(sim: &mut KubeplaySimulation) {
    while sim.scenario_is_running() {
        if !sim.step() {
            break;
        }
    }
}

pub fn pods_in_phase(sim: &KubeplaySimulation, deployment: &str, phase: PodPhase) -> Vec<String> {
    sim.cluster()
        .pods
        .values()
        .filter(|pod| pod.is_owned_by(OwnerKind::Deployment, deployment) && pod.status.phase == phase)
        .map(|pod| pod.metadata.name.clone())
        .collect()
}
