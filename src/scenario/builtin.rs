//! Built-in scenario table. Side effects refer to objects of the playground fixture
//! (deployments `web`, `db` and `cache`, nodes `worker-1`..`worker-3`). With another fixture the
//! missing references turn into no-ops and the phase sequence still completes.

use std::collections::BTreeMap;

use crate::core::api_server::Action;
use crate::core::common::{Labels, ObjectMeta, RuntimeResources};
use crate::core::job::{AuxiliaryResource, Job, JobSpec, ResourceKind};
use crate::core::node::{Taint, TaintEffect};
use crate::core::pod::PodTemplate;
use crate::scenario::definition::{ScenarioDefinition, ScenarioPhase::*, ScenarioStep};

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn scale(deployment: &str, replicas: u32) -> Action {
    Action::ScaleDeployment {
        deployment: deployment.to_string(),
        replicas,
    }
}

pub fn builtin_scenarios() -> Vec<ScenarioDefinition> {
    vec![
        ScenarioDefinition::new(
            "create-pod",
            "A standalone pod goes from kubectl to a running container",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl apply -f nginx-pod.yaml sends the pod to the API server"),
                ScenarioStep::new(600, Admitted, "Authentication, authorization and admission checks pass"),
                ScenarioStep::new(1200, Persisted, "Pod object is stored in etcd with no node assigned"),
                ScenarioStep::new(1800, Scheduled, "Scheduler filters nodes and binds the pod").with_action(
                    Action::CreatePod {
                        name: "nginx".to_string(),
                        template: PodTemplate {
                            labels: labels(&[("app", "nginx")]),
                            requests: RuntimeResources::new(100, 128),
                        },
                    },
                ),
                ScenarioStep::new(2400, NodeActing, "Kubelet pulls the image and starts the container"),
                ScenarioStep::new(3000, Complete, "Pod nginx is Running"),
            ],
        ),
        ScenarioDefinition::new(
            "scale-deployment",
            "Deployment web is scaled up to 5 replicas",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl scale deployment web --replicas=5"),
                ScenarioStep::new(500, Admitted, "API server validates the scale request"),
                ScenarioStep::new(1000, Persisted, "New replica count is stored in etcd"),
                ScenarioStep::new(1500, Reconciling, "ReplicaSet controller creates 3 new pods")
                    .with_action(scale("web", 5)),
                ScenarioStep::new(2000, Scheduled, "Scheduler spreads new pods over worker nodes"),
                ScenarioStep::new(2500, NodeActing, "Kubelets start the containers"),
                ScenarioStep::new(3000, Complete, "Deployment web has 5 ready replicas"),
            ],
        ),
        ScenarioDefinition::new(
            "scale-down",
            "Deployment web is scaled down to 1 replica",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl scale deployment web --replicas=1"),
                ScenarioStep::new(500, Persisted, "New replica count is stored in etcd"),
                ScenarioStep::new(1000, Reconciling, "ReplicaSet controller deletes the newest pods")
                    .with_action(scale("web", 1)),
                ScenarioStep::new(1500, NodeActing, "Kubelets stop the removed containers"),
                ScenarioStep::new(2000, Complete, "Deployment web has 1 ready replica"),
            ],
        ),
        ScenarioDefinition::new(
            "node-failure",
            "Node worker-2 stops responding and its pods are replaced",
            vec![
                ScenarioStep::new(0, Submitted, "Node worker-2 stops sending heartbeats"),
                ScenarioStep::new(800, Persisted, "Node controller marks worker-2 NotReady and taints it")
                    .with_action(Action::ToggleNodeFailure {
                        node: "worker-2".to_string(),
                    }),
                ScenarioStep::new(1600, Reconciling, "Controllers replace the failed pods").with_action(
                    Action::ReconcileDeployment {
                        deployment: "web".to_string(),
                    },
                ),
                ScenarioStep::new(2400, Scheduled, "Replacements are bound to healthy nodes"),
                ScenarioStep::new(3200, Complete, "Workload recovered without worker-2"),
            ],
        ),
        ScenarioDefinition::new(
            "drain-node",
            "Node worker-1 is drained for maintenance",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl drain worker-1"),
                ScenarioStep::new(700, Persisted, "Node worker-1 is cordoned"),
                ScenarioStep::new(1400, Reconciling, "Pods are evicted and recreated elsewhere")
                    .with_action(Action::EvictNode {
                        node: "worker-1".to_string(),
                    }),
                ScenarioStep::new(2100, Scheduled, "Replacements are bound to the remaining nodes"),
                ScenarioStep::new(2800, Complete, "worker-1 is empty and unschedulable"),
            ],
        ),
        ScenarioDefinition::new(
            "insufficient-resources",
            "Deployment web asks for more replicas than the cluster can hold",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl scale deployment web --replicas=20"),
                ScenarioStep::new(600, Reconciling, "ReplicaSet controller creates 18 new pods")
                    .with_action(scale("web", 20)),
                ScenarioStep::new(1200, Scheduled, "Scheduler runs out of cpu and memory, some pods stay Pending"),
                ScenarioStep::new(1800, Complete, "Pending pods carry FailedScheduling events"),
            ],
        ),
        ScenarioDefinition::new(
            "node-selector",
            "Deployment db only runs on nodes labeled disktype=ssd",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl scale deployment db --replicas=2"),
                ScenarioStep::new(600, Reconciling, "ReplicaSet controller creates a new db pod")
                    .with_action(scale("db", 2)),
                ScenarioStep::new(1200, Scheduled, "Only ssd nodes pass the NodeSelector filter"),
                ScenarioStep::new(1800, Complete, "db pods run on ssd nodes only"),
            ],
        ),
        ScenarioDefinition::new(
            "pod-anti-affinity",
            "Deployment cache keeps at most one replica per node",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl scale deployment cache --replicas=4"),
                ScenarioStep::new(600, Reconciling, "ReplicaSet controller creates new cache pods")
                    .with_action(scale("cache", 4)),
                ScenarioStep::new(1200, Scheduled, "Nodes already running a cache pod are filtered out"),
                ScenarioStep::new(1800, Complete, "One cache pod per node, the extra replica is Pending"),
            ],
        ),
        ScenarioDefinition::new(
            "taints-tolerations",
            "Node worker-3 is dedicated to gpu workloads",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl taint nodes worker-3 dedicated=gpu:NoSchedule")
                    .with_action(Action::SetNodeTaints {
                        node: "worker-3".to_string(),
                        taints: vec![Taint {
                            key: "dedicated".to_string(),
                            value: "gpu".to_string(),
                            effect: TaintEffect::NoSchedule,
                        }],
                    }),
                ScenarioStep::new(700, Reconciling, "kubectl scale deployment web --replicas=4")
                    .with_action(scale("web", 4)),
                ScenarioStep::new(1400, Scheduled, "Pods without a toleration skip worker-3"),
                ScenarioStep::new(2100, Complete, "worker-3 only takes pods tolerating dedicated=gpu"),
            ],
        ),
        ScenarioDefinition::new(
            "job-completion",
            "Job batch runs 3 pods to completion",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl create job batch").with_action(Action::CreateJob {
                    job: Job {
                        metadata: ObjectMeta::new("batch"),
                        spec: JobSpec {
                            completions: 3,
                            template: PodTemplate {
                                labels: labels(&[("app", "batch")]),
                                requests: RuntimeResources::new(200, 256),
                            },
                        },
                        status: Default::default(),
                    },
                }),
                ScenarioStep::new(800, Scheduled, "Job controller pods are bound to nodes"),
                ScenarioStep::new(1600, NodeActing, "Containers run and exit with code 0")
                    .with_action(Action::CompleteJob {
                        job: "batch".to_string(),
                    }),
                ScenarioStep::new(2400, Complete, "Job batch succeeded 3/3"),
            ],
        ),
        ScenarioDefinition::new(
            "add-configmap",
            "ConfigMap app-config is created",
            vec![
                ScenarioStep::new(0, Submitted, "kubectl create configmap app-config"),
                ScenarioStep::new(500, Persisted, "ConfigMap is stored in etcd").with_action(
                    Action::AddResource {
                        resource: AuxiliaryResource {
                            kind: ResourceKind::ConfigMap,
                            metadata: ObjectMeta::new("app-config"),
                            data: BTreeMap::from([("LOG_LEVEL".to_string(), "info".to_string())]),
                        },
                    },
                ),
                ScenarioStep::new(1000, Complete, "Pods can mount app-config"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::builtin_scenarios;

    #[test]
    fn test_builtin_scenarios_are_well_formed() {
        let scenarios = builtin_scenarios();
        let names: HashSet<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(scenarios.len(), names.len());

        for scenario in scenarios.iter() {
            assert!(!scenario.steps.is_empty(), "{} has no steps", scenario.name);
            let delays: Vec<u64> = scenario.steps.iter().map(|s| s.delay_ms).collect();
            let mut sorted = delays.clone();
            sorted.sort();
            assert_eq!(sorted, delays, "{} steps are out of order", scenario.name);
        }
    }
}
