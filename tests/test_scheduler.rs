use std::collections::BTreeSet;
use std::rc::Rc;

use dslab_kubeplay::core::common::OwnerReference;
use dslab_kubeplay::core::pod::{PodConditionType, PodEventType, PodPhase};
use dslab_kubeplay::simulator::KubeplaySimulation;
use dslab_kubeplay::test_util::helpers::{
    check_capacity_invariant, default_test_simulation_config, pods_in_phase,
    running_pods_per_node,
};

const THREE_WORKERS_WITH_WEB: &str = r#"
default_cluster:
- node_count: 3
  node_template:
    metadata:
      name: worker
    status:
      capacity:
        cpu: 1000
        ram: 2048
deployments:
- metadata:
    name: web
  spec:
    replicas: 2
    selector:
      app: web
    template:
      labels:
        tier: frontend
      requests:
        cpu: 300
        ram: 256
services:
- metadata:
    name: web-svc
  spec:
    selector:
      app: web
"#;

fn simulation(suffix: &str) -> KubeplaySimulation {
    let _ = env_logger::try_init();
    KubeplaySimulation::new(Rc::new(default_test_simulation_config(Some(suffix))))
}

fn scale(sim: &mut KubeplaySimulation, deployment: &str, replicas: u32) {
    let now = sim.sim.time();
    sim.api_server
        .borrow_mut()
        .scale_deployment(deployment, replicas, now);
}

#[test]
fn test_fixture_deployment_is_bootstrapped_from_template() {
    let sim = simulation(THREE_WORKERS_WITH_WEB);
    let cluster = sim.cluster();

    let web = &cluster.deployments["web"];
    assert_eq!(vec!["web-0", "web-1"], web.status.pod_names);
    assert_eq!(2, web.status.ready_replicas);
    for name in web.status.pod_names.iter() {
        let pod = &cluster.pods[name];
        assert_eq!(Some(OwnerReference::deployment("web")), pod.metadata.owner_reference);
        assert_eq!("web", pod.metadata.labels["app"]);
        assert_eq!("frontend", pod.metadata.labels["tier"]);
        assert_eq!(300, pod.spec.resources.requests.cpu);
    }
}

#[test]
fn test_scale_up_respects_capacity() {
    let mut sim = simulation(THREE_WORKERS_WITH_WEB);
    scale(&mut sim, "web", 20);

    // every node fits exactly 3 pods of 300m
    assert_eq!(9, pods_in_phase(&sim, "web", PodPhase::Running).len());
    assert_eq!(11, pods_in_phase(&sim, "web", PodPhase::Pending).len());
    check_capacity_invariant(&sim);

    let cluster = sim.cluster();
    let web = &cluster.deployments["web"];
    assert_eq!(20, web.spec.replicas);
    assert_eq!(20, web.status.replicas);
    assert_eq!(9, web.status.ready_replicas);
    assert_eq!(9, web.status.available_replicas);
    assert_eq!(11, sim.metrics_collector.borrow().pods_unschedulable);
}

#[test]
fn test_batch_placement_rotates_over_nodes() {
    let mut sim = simulation(THREE_WORKERS_WITH_WEB);
    scale(&mut sim, "web", 5);

    let per_node = running_pods_per_node(&sim, "web");
    assert_eq!(3, per_node.len());
    assert_eq!(5, per_node.values().sum::<usize>());
    assert!(per_node.values().all(|count| *count >= 1 && *count <= 3));
}

#[test]
fn test_reconcile_is_idempotent() {
    let mut sim = simulation(THREE_WORKERS_WITH_WEB);
    scale(&mut sim, "web", 3);
    let before = sim.cluster();

    let now = sim.sim.time();
    let plan = sim.api_server.borrow_mut().scale_deployment("web", 3, now);

    assert!(plan.is_empty());
    let after = sim.cluster();
    assert_eq!(before.pods, after.pods);
    assert_eq!(
        before.deployments["web"].status.pod_names,
        after.deployments["web"].status.pod_names
    );
}

#[test]
fn test_round_trip_scale_removes_most_recent_pods() {
    let mut sim = simulation(THREE_WORKERS_WITH_WEB);
    scale(&mut sim, "web", 5);

    let now = sim.sim.time();
    let plan = sim.api_server.borrow_mut().scale_deployment("web", 2, now);
    assert_eq!(vec!["web-2", "web-3", "web-4"], plan.removals);

    let cluster = sim.cluster();
    let web = &cluster.deployments["web"];
    assert_eq!(2, web.spec.replicas);
    assert_eq!(vec!["web-0", "web-1"], web.status.pod_names);
    assert_eq!(2, web.status.ready_replicas);
    assert_eq!(5, web.status.created_total);
    assert_eq!(2, cluster.pods.len());

    // new pods get fresh names
    scale(&mut sim, "web", 3);
    assert!(sim.cluster().pods.contains_key("web-5"));
}

#[test]
fn test_scale_to_zero_and_back() {
    let mut sim = simulation(THREE_WORKERS_WITH_WEB);
    scale(&mut sim, "web", 0);
    assert!(sim.cluster().pods.is_empty());

    scale(&mut sim, "web", 2);
    let running = pods_in_phase(&sim, "web", PodPhase::Running);
    assert_eq!(2, running.len());
    assert_eq!(300, sim.cluster().pods[&running[0]].spec.resources.requests.cpu);
}

#[test]
fn test_service_members_are_exactly_running_matching_pods() {
    let mut sim = simulation(THREE_WORKERS_WITH_WEB);
    scale(&mut sim, "web", 12);

    let cluster = sim.cluster();
    let expected: Vec<String> = pods_in_phase(&sim, "web", PodPhase::Running);
    assert_eq!(9, expected.len());
    assert_eq!(expected, cluster.services["web-svc"].status.pod_names);

    scale(&mut sim, "web", 1);
    assert_eq!(
        vec!["web-0"],
        sim.cluster().services["web-svc"].status.pod_names
    );
}

#[test]
fn test_node_selector_places_pod_on_matching_node() {
    let mut sim = simulation(
        r#"
default_cluster:
- node_template:
    metadata:
      name: hdd-node
      labels:
        disktype: hdd
    status:
      capacity:
        cpu: 1000
        ram: 1024
- node_template:
    metadata:
      name: ssd-node
      labels:
        disktype: ssd
    status:
      capacity:
        cpu: 1000
        ram: 1024
deployments:
- metadata:
    name: db
  spec:
    replicas: 0
    selector:
      app: db
    template:
      requests:
        cpu: 100
        ram: 128
    placement:
      node_selector:
        disktype: ssd
"#,
    );
    scale(&mut sim, "db", 1);
    let cluster = sim.cluster();
    assert_eq!(1, cluster.pods.len());
    assert_eq!(
        Some("ssd-node".to_string()),
        cluster.pods["db-0"].status.node_name
    );
    assert_eq!(0, cluster.pods_on_node("hdd-node").count());

    scale(&mut sim, "db", 4);
    assert_eq!(4, sim.cluster().pods_on_node("ssd-node").count());
    assert_eq!(0, sim.cluster().pods_on_node("hdd-node").count());
}

#[test]
fn test_node_affinity_terms_are_ored() {
    let mut sim = simulation(
        r#"
default_cluster:
- node_template:
    metadata:
      name: a
      labels:
        zone: zone-a
    status:
      capacity:
        cpu: 1000
        ram: 1024
- node_template:
    metadata:
      name: b
      labels:
        zone: zone-b
    status:
      capacity:
        cpu: 1000
        ram: 1024
- node_template:
    metadata:
      name: c
      labels:
        zone: zone-c
        gpu: "true"
    status:
      capacity:
        cpu: 1000
        ram: 1024
deployments:
- metadata:
    name: app
  spec:
    replicas: 6
    selector:
      app: app
    template:
      requests:
        cpu: 100
        ram: 100
    placement:
      node_affinity:
      - match_expressions:
        - key: zone
          operator: In
          values: [zone-a]
      - match_expressions:
        - key: gpu
          operator: Exists
"#,
    );
    let per_node = running_pods_per_node(&sim, "app");
    assert_eq!(6, per_node.values().sum::<usize>());
    assert!(!per_node.contains_key("b"));

    scale(&mut sim, "app", 12);
    let per_node = running_pods_per_node(&sim, "app");
    assert_eq!(12, per_node.values().sum::<usize>());
    assert!(!per_node.contains_key("b"));
}

#[test]
fn test_insufficient_capacity_leaves_pod_pending() {
    let mut sim = simulation(
        r#"
default_cluster:
- node_template:
    metadata:
      name: small
    status:
      capacity:
        cpu: 100
        ram: 1024
deployments:
- metadata:
    name: filler
  spec:
    replicas: 1
    selector:
      app: filler
    template:
      requests:
        cpu: 100
        ram: 128
- metadata:
    name: web
  spec:
    replicas: 0
    selector:
      app: web
    template:
      requests:
        cpu: 100
        ram: 128
"#,
    );
    assert_eq!(100, sim.cluster().node_usage("small").cpu);

    let now = sim.sim.time();
    let plan = sim.api_server.borrow_mut().scale_deployment("web", 1, now);
    assert_eq!(vec![("web-0".to_string(), None)], plan.placements);

    let cluster = sim.cluster();
    let pod = &cluster.pods["web-0"];
    assert_eq!(PodPhase::Pending, pod.status.phase);
    assert_eq!(None, pod.status.node_name);

    let condition = pod.get_condition(PodConditionType::PodScheduled).unwrap();
    assert_eq!("False", condition.status);
    assert_eq!(Some("Unschedulable".to_string()), condition.reason);
    assert_eq!(
        Some("0/1 nodes are available: insufficient cpu or memory".to_string()),
        condition.message
    );

    let event = pod.status.events.last().unwrap();
    assert_eq!(PodEventType::Warning, event.event_type);
    assert_eq!("FailedScheduling", event.reason);

    let web = &cluster.deployments["web"];
    assert_eq!(1, web.status.replicas);
    assert_eq!(0, web.status.ready_replicas);
}

#[test]
fn test_pod_anti_affinity_keeps_one_pod_per_node() {
    let mut sim = simulation(
        r#"
default_cluster:
- node_count: 3
  node_template:
    metadata:
      name: worker
    status:
      capacity:
        cpu: 1000
        ram: 2048
deployments:
- metadata:
    name: cache
  spec:
    replicas: 0
    selector:
      app: cache
    template:
      requests:
        cpu: 100
        ram: 128
    placement:
      pod_anti_affinity:
      - label_selector:
          app: cache
        topology_key: kubernetes.io/hostname
"#,
    );
    // a single batch must see the siblings placed earlier in it
    scale(&mut sim, "cache", 5);

    let per_node = running_pods_per_node(&sim, "cache");
    assert_eq!(3, per_node.len());
    assert!(per_node.values().all(|count| *count == 1));

    let pending = pods_in_phase(&sim, "cache", PodPhase::Pending);
    assert_eq!(2, pending.len());
    let cluster = sim.cluster();
    let message = cluster.pods[&pending[0]]
        .get_condition(PodConditionType::PodScheduled)
        .and_then(|c| c.message.clone())
        .unwrap();
    assert!(message.contains("placement constraints"));
}

#[test]
fn test_pod_anti_affinity_by_zone() {
    let mut sim = simulation(
        r#"
default_cluster:
- node_count: 2
  node_template:
    metadata:
      name: a
      labels:
        zone: zone-a
    status:
      capacity:
        cpu: 1000
        ram: 2048
- node_count: 1
  node_template:
    metadata:
      labels:
        zone: zone-b
    status:
      capacity:
        cpu: 1000
        ram: 2048
deployments:
- metadata:
    name: spread
  spec:
    replicas: 0
    selector:
      app: spread
    template:
      requests:
        cpu: 100
        ram: 128
    placement:
      pod_anti_affinity:
      - label_selector:
          app: spread
        topology_key: zone
"#,
    );
    scale(&mut sim, "spread", 3);

    let cluster = sim.cluster();
    let zones: BTreeSet<String> = pods_in_phase(&sim, "spread", PodPhase::Running)
        .iter()
        .map(|name| {
            let node = cluster.pods[name].status.node_name.clone().unwrap();
            cluster.nodes[&node].metadata.labels["zone"].clone()
        })
        .collect();
    assert_eq!(
        BTreeSet::from(["zone-a".to_string(), "zone-b".to_string()]),
        zones
    );
    assert_eq!(1, pods_in_phase(&sim, "spread", PodPhase::Pending).len());
}

#[test]
fn test_placement_is_deterministic_for_same_seed() {
    let placements = |sim: &KubeplaySimulation| -> Vec<(String, Option<String>)> {
        sim.cluster()
            .pods
            .values()
            .map(|pod| (pod.metadata.name.clone(), pod.status.node_name.clone()))
            .collect()
    };
    let mut first = simulation(THREE_WORKERS_WITH_WEB);
    let mut second = simulation(THREE_WORKERS_WITH_WEB);
    for replicas in [7, 4, 8] {
        scale(&mut first, "web", replicas);
        scale(&mut second, "web", replicas);
    }
    assert_eq!(placements(&first), placements(&second));
}

#[test]
fn test_scale_of_missing_deployment_is_noop() {
    let mut sim = simulation(THREE_WORKERS_WITH_WEB);
    let version = sim.repository.borrow().version();
    let now = sim.sim.time();

    let plan = sim.api_server.borrow_mut().scale_deployment("ghost", 3, now);

    assert!(plan.is_empty());
    assert_eq!(version, sim.repository.borrow().version());
}
