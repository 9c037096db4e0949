//! Implementation of scheduler component which is responsible for placing pods on nodes and
//! reconciling workloads towards their desired replica count.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::cluster::ClusterSnapshot;
use crate::core::common::{OwnerKind, OwnerReference};
use crate::core::node::Node;
use crate::core::pod::{Pod, PodConditionType, PodEventType, PodPhase, PodTemplate};
use crate::core::scheduler::interface::{NodeSelectionPolicy, ReconcilePlan, ScheduleError};
use crate::core::scheduler::plugin::{FilterContext, FilterPlugin, PLUGIN_REGISTRY};
use crate::core::scheduler::round_robin::RoundRobinPolicy;
use crate::metrics::collector::MetricsCollector;

pub struct Scheduler {
    filters: Vec<&'static dyn FilterPlugin>,
    policy: Box<dyn NodeSelectionPolicy>,

    metrics_collector: Rc<RefCell<MetricsCollector>>,
}

impl Scheduler {
    pub fn new(
        config: &SchedulerConfig,
        seed: u64,
        metrics_collector: Rc<RefCell<MetricsCollector>>,
    ) -> Self {
        let filters = config
            .filters
            .iter()
            .map(|name| match PLUGIN_REGISTRY.get(name.as_str()) {
                Some(plugin) => plugin.as_ref(),
                None => panic!("Unknown filter plugin: {:?}", name),
            })
            .collect();
        Self {
            filters,
            policy: Box::new(RoundRobinPolicy::new(seed)),
            metrics_collector,
        }
    }

    pub fn set_policy(&mut self, policy: Box<dyn NodeSelectionPolicy>) {
        self.policy = policy;
    }

    /// Worker nodes which pass every enabled filter for the pod, in node name order.
    pub fn filter_nodes<'a>(&self, pod: &'a Pod, cluster: &'a ClusterSnapshot) -> Vec<&'a Node> {
        let placement = cluster.placement_for(pod);
        let ctx = FilterContext {
            pod,
            placement: &placement,
            cluster,
        };
        let mut nodes: Vec<&Node> = cluster.nodes.values().collect();
        for filter in self.filters.iter() {
            nodes = filter.filter(&ctx, nodes);
        }
        nodes
    }

    fn select_node(&mut self, pod: &Pod, cluster: &ClusterSnapshot) -> Result<String, ScheduleError> {
        let candidates = self.filter_nodes(pod, cluster);
        self.policy.select_node(pod, &candidates, cluster)
    }

    fn bind(&mut self, pod: &mut Pod, node_name: &str, now: f64) {
        pod.status.phase = PodPhase::Running;
        pod.status.node_name = Some(node_name.to_string());
        for condition_type in [
            PodConditionType::Initialized,
            PodConditionType::Ready,
            PodConditionType::ContainersReady,
            PodConditionType::PodScheduled,
        ] {
            pod.update_condition("True", condition_type, None, None, now);
        }
        pod.record_event(
            PodEventType::Normal,
            "Scheduled",
            format!(
                "Successfully assigned {} to {}",
                pod.metadata.name, node_name
            ),
            now,
        );
        debug!("Pod {:?} has been assigned a Node {:?}", pod.metadata.name, node_name);
        self.metrics_collector.borrow_mut().pods_scheduled += 1;
    }

    fn mark_unschedulable(&mut self, pod: &mut Pod, err: ScheduleError, total_nodes: usize, now: f64) {
        let message = err.message(total_nodes);
        pod.status.phase = PodPhase::Pending;
        pod.status.node_name = None;
        pod.update_condition(
            "False",
            PodConditionType::PodScheduled,
            Some("Unschedulable"),
            Some(message.clone()),
            now,
        );
        pod.record_event(PodEventType::Warning, "FailedScheduling", message, now);
        info!("Pod {:?} is unschedulable: {:?}", pod.metadata.name, err);
        self.metrics_collector.borrow_mut().pods_unschedulable += 1;
    }

    /// Places new pods one at a time. Every pod is inserted into the cluster before the next one is
    /// considered, so capacity and anti-affinity checks see siblings placed earlier in the batch.
    /// Pods which do not fit anywhere stay Pending. Returns (pod, node) in placement order.
    pub fn place_pods(
        &mut self,
        pods: Vec<Pod>,
        cluster: &mut ClusterSnapshot,
        now: f64,
    ) -> Vec<(String, Option<String>)> {
        let worker_count = cluster.nodes.values().filter(|n| n.is_worker()).count();
        self.policy.start_batch(worker_count);

        let mut placements = Vec::with_capacity(pods.len());
        for mut pod in pods.into_iter() {
            pod.metadata.creation_timestamp = now;
            let assigned = match self.select_node(&pod, cluster) {
                Ok(node_name) => {
                    self.bind(&mut pod, &node_name, now);
                    Some(node_name)
                }
                Err(err) => {
                    self.mark_unschedulable(&mut pod, err, cluster.nodes.len(), now);
                    None
                }
            };
            placements.push((pod.metadata.name.clone(), assigned));
            cluster.pods.insert(pod.metadata.name.clone(), pod);
        }
        placements
    }

    /// Brings the deployment's pod set to `desired_replicas`. Scale up creates pods from a resolved
    /// template and places them, scale down removes the most recently added members.
    /// Derived counters and every service are refreshed in all cases.
    pub fn reconcile(
        &mut self,
        deployment_name: &str,
        desired_replicas: u32,
        cluster: &mut ClusterSnapshot,
        known_good: &ClusterSnapshot,
        now: f64,
    ) -> ReconcilePlan {
        let reconcile_start = Instant::now();
        let mut plan = ReconcilePlan::default();

        if !cluster.deployments.contains_key(deployment_name) {
            warn!(
                "Reconcile of missing deployment {:?} is skipped",
                deployment_name
            );
            return plan;
        }
        cluster.refresh_deployment(deployment_name);

        let current = cluster.deployments[deployment_name].status.pod_names.len() as u32;
        if desired_replicas > current {
            match resolve_template(deployment_name, cluster, known_good) {
                Some(template) => {
                    let new_pods = self.new_member_pods(
                        deployment_name,
                        &template,
                        desired_replicas - current,
                        cluster,
                    );
                    plan.placements = self.place_pods(new_pods, cluster, now);
                }
                None => warn!(
                    "No pod template for deployment {:?}, replicas are not created",
                    deployment_name
                ),
            }
        } else if desired_replicas < current {
            if let Some(deployment) = cluster.deployments.get_mut(deployment_name) {
                plan.removals = deployment
                    .status
                    .pod_names
                    .split_off(desired_replicas as usize);
            }
            for pod_name in plan.removals.iter() {
                cluster.pods.remove(pod_name);
                debug!("Pod {:?} removed by scale down", pod_name);
            }
            self.metrics_collector.borrow_mut().pods_removed += plan.removals.len() as u64;
        }

        if let Some(deployment) = cluster.deployments.get_mut(deployment_name) {
            deployment.spec.replicas = desired_replicas;
        }
        cluster.refresh_deployment(deployment_name);
        cluster.refresh_services();

        self.metrics_collector
            .borrow_mut()
            .increment_reconcile_latency(reconcile_start.elapsed().as_secs_f64());
        plan
    }

    fn new_member_pods(
        &self,
        deployment_name: &str,
        template: &PodTemplate,
        count: u32,
        cluster: &mut ClusterSnapshot,
    ) -> Vec<Pod> {
        let Some(deployment) = cluster.deployments.get_mut(deployment_name) else {
            return vec![];
        };
        let mut labels = template.labels.clone();
        labels.extend(deployment.spec.selector.clone());

        let mut pods = vec![];
        for _ in 0..count {
            // ordinals held by pods of other owners are skipped
            let mut name = deployment.next_pod_name();
            while cluster.pods.contains_key(&name) {
                name = deployment.next_pod_name();
            }
            let mut pod = Pod::from_template(&name, template);
            pod.metadata.labels = labels.clone();
            pod.metadata.owner_reference = Some(OwnerReference::deployment(deployment_name));
            deployment.status.pod_names.push(name);
            pods.push(pod);
        }
        pods
    }

    /// Re-attempts every Pending pod, oldest name first. Pods which still do not fit stay untouched.
    /// Returns pods bound by this retry.
    pub fn retry_pending_pods(
        &mut self,
        cluster: &mut ClusterSnapshot,
        now: f64,
    ) -> Vec<(String, String)> {
        let pending: Vec<String> = cluster
            .pods
            .values()
            .filter(|pod| pod.status.phase == PodPhase::Pending)
            .map(|pod| pod.metadata.name.clone())
            .collect();
        if pending.is_empty() {
            return vec![];
        }

        let worker_count = cluster.nodes.values().filter(|n| n.is_worker()).count();
        self.policy.start_batch(worker_count);

        let mut bound = vec![];
        for pod_name in pending {
            let Some(mut pod) = cluster.pods.get(&pod_name).cloned() else {
                continue;
            };
            if let Ok(node_name) = self.select_node(&pod, cluster) {
                self.bind(&mut pod, &node_name, now);
                cluster.pods.insert(pod_name.clone(), pod);
                bound.push((pod_name, node_name));
            }
        }
        cluster.refresh_derived();
        bound
    }
}

/// Template for new pods of a deployment: an existing member, else a pod of the same deployment in
/// the known-good snapshot, else the deployment's template fixture, else any pod in the cluster.
fn resolve_template(
    deployment_name: &str,
    cluster: &ClusterSnapshot,
    known_good: &ClusterSnapshot,
) -> Option<PodTemplate> {
    let deployment = cluster.deployments.get(deployment_name)?;

    let member = deployment
        .status
        .pod_names
        .iter()
        .find_map(|name| cluster.pods.get(name));
    let recorded = || {
        known_good
            .deployments
            .get(deployment_name)
            .and_then(|d| d.status.pod_names.first())
            .and_then(|name| known_good.pods.get(name))
            .or_else(|| {
                known_good
                    .pods
                    .values()
                    .find(|pod| pod.is_owned_by(OwnerKind::Deployment, deployment_name))
            })
    };

    member
        .or_else(recorded)
        .map(Pod::to_template)
        .or_else(|| deployment.spec.template.clone())
        .or_else(|| cluster.pods.values().next().map(Pod::to_template))
}
