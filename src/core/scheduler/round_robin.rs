//! Round-robin node selection with a pseudo-random starting point per batch.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::core::cluster::ClusterSnapshot;
use crate::core::node::Node;
use crate::core::pod::Pod;
use crate::core::scheduler::interface::{NodeSelectionPolicy, ScheduleError};

pub struct RoundRobinPolicy {
    rng: Pcg64,
    offset: usize,
    // Units placed (or attempted) in the current batch.
    position: usize,
}

impl RoundRobinPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
            offset: 0,
            position: 0,
        }
    }
}

impl NodeSelectionPolicy for RoundRobinPolicy {
    fn start_batch(&mut self, worker_count: usize) {
        // rotating the start avoids always filling the first node for repeated identical calls
        self.offset = self.rng.gen_range(0..worker_count.max(1));
        self.position = 0;
    }

    fn select_node(
        &mut self,
        pod: &Pod,
        candidates: &[&Node],
        cluster: &ClusterSnapshot,
    ) -> Result<String, ScheduleError> {
        if candidates.is_empty() {
            return Err(ScheduleError::NoCandidateNodes);
        }
        let len = candidates.len();
        let pick = (self.offset + self.position) % len;
        self.position += 1;

        // the round-robin pick first, then the remaining candidates in rotation order
        let requests = &pod.spec.resources.requests;
        (0..len)
            .map(|step| candidates[(pick + step) % len])
            .find(|node| cluster.fits(&node.metadata.name, requests))
            .map(|node| node.metadata.name.clone())
            .ok_or(ScheduleError::NoSufficientResources)
    }
}

#[cfg(test)]
mod tests {
    use super::RoundRobinPolicy;
    use crate::core::cluster::ClusterSnapshot;
    use crate::core::node::Node;
    use crate::core::pod::{Pod, PodPhase};
    use crate::core::scheduler::interface::{NodeSelectionPolicy, ScheduleError};

    fn cluster_with_nodes(count: usize) -> ClusterSnapshot {
        let mut cluster = ClusterSnapshot::default();
        for i in 0..count {
            let name = format!("node_{}", i);
            cluster.nodes.insert(name.clone(), Node::new(&name, 1000, 1024));
        }
        cluster
    }

    #[test]
    fn test_consecutive_picks_rotate_over_candidates() {
        let cluster = cluster_with_nodes(3);
        let candidates: Vec<&Node> = cluster.nodes.values().collect();
        let pod = Pod::new("pod", 100, 100);

        let mut policy = RoundRobinPolicy::new(7);
        policy.start_batch(3);
        let mut picked: Vec<String> = (0..3)
            .map(|_| policy.select_node(&pod, &candidates, &cluster).unwrap())
            .collect();
        picked.sort();
        assert_eq!(vec!["node_0", "node_1", "node_2"], picked);
    }

    #[test]
    fn test_falls_back_to_first_node_that_fits() {
        let mut cluster = cluster_with_nodes(3);
        // fill node_0 and node_2
        for (i, node) in ["node_0", "node_2"].iter().enumerate() {
            let mut pod = Pod::new(&format!("filler_{}", i), 1000, 100);
            pod.status.phase = PodPhase::Running;
            pod.status.node_name = Some(node.to_string());
            cluster.pods.insert(pod.metadata.name.clone(), pod);
        }
        let candidates: Vec<&Node> = cluster.nodes.values().collect();
        let pod = Pod::new("pod", 100, 100);

        for seed in 0..10 {
            let mut policy = RoundRobinPolicy::new(seed);
            policy.start_batch(3);
            assert_eq!(
                "node_1",
                policy.select_node(&pod, &candidates, &cluster).unwrap()
            );
        }
    }

    #[test]
    fn test_errors() {
        let cluster = cluster_with_nodes(1);
        let mut policy = RoundRobinPolicy::new(0);
        policy.start_batch(1);

        let pod = Pod::new("pod", 100, 100);
        assert_eq!(
            ScheduleError::NoCandidateNodes,
            policy.select_node(&pod, &[], &cluster).err().unwrap()
        );

        let big_pod = Pod::new("big_pod", 2000, 100);
        let candidates: Vec<&Node> = cluster.nodes.values().collect();
        assert_eq!(
            ScheduleError::NoSufficientResources,
            policy.select_node(&big_pod, &candidates, &cluster).err().unwrap()
        );
    }
}
