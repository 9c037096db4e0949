//! Implementation of kube-api-server component: the only legal entry points which mutate the
//! cluster repository. Every operation reads the current snapshot, computes the next one and
//! publishes it as a whole, then the derived views (deployment counters, job status, service
//! members) are refreshed. Operations naming a missing object log a warning and change nothing.

use std::cell::RefCell;
use std::rc::Rc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::cluster::ClusterSnapshot;
use crate::core::cluster_repository::ClusterRepository;
use crate::core::common::{Labels, OwnerKind, OwnerReference};
use crate::core::deployment::Deployment;
use crate::core::job::{AuxiliaryResource, Job};
use crate::core::node::{Node, NodeConditionType, Taint, TaintEffect, TAINT_NODE_NOT_READY};
use crate::core::pod::{Pod, PodConditionType, PodEventType, PodPhase, PodTemplate};
use crate::core::scheduler::interface::ReconcilePlan;
use crate::core::scheduler::scheduler::Scheduler;
use crate::core::service::Service;
use crate::metrics::collector::MetricsCollector;

/// Serializable form of the api server operations, attached to scenario steps.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum Action {
    CreateDeployment {
        deployment: Deployment,
    },
    CreateService {
        service: Service,
    },
    ScaleDeployment {
        deployment: String,
        replicas: u32,
    },
    /// Drops failed member pods and recreates the deployment up to its desired replicas.
    ReconcileDeployment {
        deployment: String,
    },
    CreatePod {
        name: String,
        template: PodTemplate,
    },
    RemovePod {
        pod: String,
    },
    AddNode {
        node: Node,
    },
    ToggleNodeFailure {
        node: String,
    },
    EvictNode {
        node: String,
    },
    UncordonNode {
        node: String,
    },
    AddResource {
        resource: AuxiliaryResource,
    },
    CreateJob {
        job: Job,
    },
    CompleteJob {
        job: String,
    },
    UpdateNodeLabels {
        node: String,
        #[serde(default)]
        labels: Labels,
        #[serde(default)]
        remove: Vec<String>,
    },
    SetNodeTaints {
        node: String,
        #[serde(default)]
        taints: Vec<Taint>,
    },
}

pub struct KubeApiServer {
    repository: Rc<RefCell<ClusterRepository>>,
    scheduler: Rc<RefCell<Scheduler>>,

    metrics_collector: Rc<RefCell<MetricsCollector>>,
}

impl KubeApiServer {
    pub fn new(
        repository: Rc<RefCell<ClusterRepository>>,
        scheduler: Rc<RefCell<Scheduler>>,
        metrics_collector: Rc<RefCell<MetricsCollector>>,
    ) -> Self {
        Self {
            repository,
            scheduler,
            metrics_collector,
        }
    }

    /// Read-only snapshot for consumers.
    pub fn cluster(&self) -> Rc<ClusterSnapshot> {
        self.repository.borrow().snapshot()
    }

    pub fn apply(&mut self, action: &Action, now: f64) {
        match action.clone() {
            Action::CreateDeployment { deployment } => {
                self.create_deployment(deployment, now);
            }
            Action::CreateService { service } => self.create_service(service, now),
            Action::ScaleDeployment {
                deployment,
                replicas,
            } => {
                self.scale_deployment(&deployment, replicas, now);
            }
            Action::ReconcileDeployment { deployment } => {
                self.reconcile_deployment(&deployment, now);
            }
            Action::CreatePod { name, template } => {
                self.create_pod(&name, &template, now);
            }
            Action::RemovePod { pod } => self.remove_pod(&pod),
            Action::AddNode { node } => self.add_node(node, now),
            Action::ToggleNodeFailure { node } => {
                self.toggle_node_failure(&node, now);
            }
            Action::EvictNode { node } => self.evict_node(&node, now),
            Action::UncordonNode { node } => self.uncordon_node(&node, now),
            Action::AddResource { resource } => self.add_resource(resource, now),
            Action::CreateJob { job } => self.create_job(job, now),
            Action::CompleteJob { job } => self.complete_job(&job, now),
            Action::UpdateNodeLabels {
                node,
                labels,
                remove,
            } => self.update_node_labels(&node, labels, &remove, now),
            Action::SetNodeTaints { node, taints } => self.set_node_taints(&node, taints, now),
        }
    }

    // Atomic read-compute-replace with the scheduler at hand, derived views are refreshed last.
    fn mutate<F, R>(&self, change: F) -> R
    where
        F: FnOnce(&mut ClusterSnapshot, &mut Scheduler) -> R,
    {
        let mut scheduler = self.scheduler.borrow_mut();
        ClusterRepository::update_shared(&self.repository, |cluster| {
            let result = change(cluster, &mut *scheduler);
            cluster.refresh_derived();
            result
        })
    }

    fn node_exists(&self, node_name: &str, operation: &str) -> bool {
        let exists = self.cluster().nodes.contains_key(node_name);
        if !exists {
            warn!("{}: node {:?} does not exist", operation, node_name);
        }
        exists
    }

    /// Adds the deployment with no pods and reconciles it up to `spec.replicas`.
    pub fn create_deployment(&mut self, mut deployment: Deployment, now: f64) -> ReconcilePlan {
        let name = deployment.metadata.name.clone();
        if self.cluster().deployments.contains_key(&name) {
            warn!("Create: deployment {:?} already exists", name);
            return ReconcilePlan::default();
        }
        deployment.metadata.creation_timestamp = now;
        deployment.status = Default::default();
        let desired = deployment.spec.replicas;
        deployment.spec.replicas = 0;

        let known_good = self.repository.borrow().known_good();
        self.mutate(|cluster, scheduler| {
            cluster.deployments.insert(name.clone(), deployment);
            scheduler.reconcile(&name, desired, cluster, &known_good, now)
        })
    }

    pub fn create_service(&mut self, mut service: Service, now: f64) {
        if self.cluster().services.contains_key(&service.metadata.name) {
            warn!("Create: service {:?} already exists", service.metadata.name);
            return;
        }
        service.metadata.creation_timestamp = now;
        service.status = Default::default();
        self.mutate(|cluster, _| {
            cluster.services.insert(service.metadata.name.clone(), service);
        });
    }

    pub fn scale_deployment(&mut self, deployment: &str, replicas: u32, now: f64) -> ReconcilePlan {
        if !self.cluster().deployments.contains_key(deployment) {
            warn!("Scale: deployment {:?} does not exist", deployment);
            return ReconcilePlan::default();
        }
        let known_good = self.repository.borrow().known_good();
        info!("Scaling deployment {:?} to {} replicas", deployment, replicas);
        self.mutate(|cluster, scheduler| {
            scheduler.reconcile(deployment, replicas, cluster, &known_good, now)
        })
    }

    pub fn reconcile_deployment(&mut self, deployment: &str, now: f64) -> ReconcilePlan {
        if !self.cluster().deployments.contains_key(deployment) {
            warn!("Reconcile: deployment {:?} does not exist", deployment);
            return ReconcilePlan::default();
        }
        let known_good = self.repository.borrow().known_good();
        let metrics_collector = self.metrics_collector.clone();
        self.mutate(|cluster, scheduler| {
            let failed: Vec<String> = cluster
                .pods
                .values()
                .filter(|pod| {
                    pod.is_owned_by(OwnerKind::Deployment, deployment)
                        && pod.status.phase == PodPhase::Failed
                })
                .map(|pod| pod.metadata.name.clone())
                .collect();
            for pod_name in failed.iter() {
                cluster.pods.remove(pod_name);
            }
            metrics_collector.borrow_mut().pods_removed += failed.len() as u64;

            let desired = cluster.deployments[deployment].spec.replicas;
            let mut plan = scheduler.reconcile(deployment, desired, cluster, &known_good, now);
            plan.removals.extend(failed);
            plan
        })
    }

    /// Creates a standalone pod and places it. Returns the assigned node, None if it stays pending.
    pub fn create_pod(&mut self, name: &str, template: &PodTemplate, now: f64) -> Option<String> {
        if self.cluster().pods.contains_key(name) {
            warn!("Create: pod {:?} already exists", name);
            return None;
        }
        let pod = Pod::from_template(name, template);
        self.mutate(|cluster, scheduler| {
            scheduler
                .place_pods(vec![pod], cluster, now)
                .pop()
                .and_then(|(_, node)| node)
        })
    }

    pub fn remove_pod(&mut self, pod_name: &str) {
        if !self.cluster().pods.contains_key(pod_name) {
            warn!("Remove: pod {:?} does not exist", pod_name);
            return;
        }
        self.mutate(|cluster, _| {
            cluster.pods.remove(pod_name);
        });
        self.metrics_collector.borrow_mut().pods_removed += 1;
    }

    pub fn add_node(&mut self, mut node: Node, now: f64) {
        if self.cluster().nodes.contains_key(&node.metadata.name) {
            warn!("Add: node {:?} already exists", node.metadata.name);
            return;
        }
        node.metadata.creation_timestamp = now;
        node.update_condition("True".to_string(), NodeConditionType::NodeCreated, now);
        node.update_condition("True".to_string(), NodeConditionType::NodeReady, now);
        self.mutate(|cluster, scheduler| {
            cluster.nodes.insert(node.metadata.name.clone(), node);
            scheduler.retry_pending_pods(cluster, now);
        });
    }

    /// Fails a ready node or recovers a failed one. Returns whether the node is ready afterwards.
    /// Running pods of a failing node become Failed and keep their node reference. A recovered node
    /// takes pending pods.
    pub fn toggle_node_failure(&mut self, node_name: &str, now: f64) -> bool {
        if !self.node_exists(node_name, "Toggle failure") {
            return false;
        }
        let metrics_collector = self.metrics_collector.clone();
        self.mutate(|cluster, scheduler| {
            let Some(node) = cluster.nodes.get_mut(node_name) else {
                return false;
            };
            if node.is_ready() {
                node.update_condition("False".to_string(), NodeConditionType::NodeReady, now);
                node.remove_taint(TAINT_NODE_NOT_READY);
                node.spec.taints.push(Taint {
                    key: TAINT_NODE_NOT_READY.to_string(),
                    value: String::new(),
                    effect: TaintEffect::NoExecute,
                });

                let mut failed = 0;
                for pod in cluster.pods.values_mut() {
                    if pod.is_running() && pod.status.node_name.as_deref() == Some(node_name) {
                        pod.status.phase = PodPhase::Failed;
                        pod.update_condition(
                            "False",
                            PodConditionType::Ready,
                            Some("NodeNotReady"),
                            None,
                            now,
                        );
                        pod.record_event(
                            PodEventType::Warning,
                            "NodeNotReady",
                            format!("Node {} is not ready", node_name),
                            now,
                        );
                        failed += 1;
                    }
                }
                info!("Node {:?} failed, {} pods failed with it", node_name, failed);
                let mut metrics = metrics_collector.borrow_mut();
                metrics.node_failures += 1;
                metrics.pods_failed += failed;
                false
            } else {
                node.update_condition("True".to_string(), NodeConditionType::NodeReady, now);
                node.remove_taint(TAINT_NODE_NOT_READY);
                info!("Node {:?} recovered", node_name);
                scheduler.retry_pending_pods(cluster, now);
                true
            }
        })
    }

    /// Drain: cordons the node, removes every pod bound to it and recreates the replicas of owning
    /// deployments on other nodes.
    pub fn evict_node(&mut self, node_name: &str, now: f64) {
        if !self.node_exists(node_name, "Evict") {
            return;
        }
        let known_good = self.repository.borrow().known_good();
        let metrics_collector = self.metrics_collector.clone();
        self.mutate(|cluster, scheduler| {
            if let Some(node) = cluster.nodes.get_mut(node_name) {
                node.spec.unschedulable = true;
            }
            let evicted: Vec<Pod> = cluster
                .pods
                .values()
                .filter(|pod| pod.status.node_name.as_deref() == Some(node_name))
                .cloned()
                .collect();
            let mut owners: Vec<String> = vec![];
            for pod in evicted.iter() {
                cluster.pods.remove(&pod.metadata.name);
                let Some(owner) = &pod.metadata.owner_reference else {
                    continue;
                };
                if owner.kind == OwnerKind::Deployment
                    && cluster.deployments.contains_key(&owner.name)
                    && !owners.contains(&owner.name)
                {
                    owners.push(owner.name.clone());
                }
            }
            info!("Node {:?} drained, {} pods evicted", node_name, evicted.len());
            {
                let mut metrics = metrics_collector.borrow_mut();
                metrics.node_evictions += 1;
                metrics.pods_removed += evicted.len() as u64;
            }

            for owner in owners.iter() {
                let desired = cluster.deployments[owner].spec.replicas;
                scheduler.reconcile(owner, desired, cluster, &known_good, now);
            }
        });
    }

    pub fn uncordon_node(&mut self, node_name: &str, now: f64) {
        if !self.node_exists(node_name, "Uncordon") {
            return;
        }
        self.mutate(|cluster, scheduler| {
            if let Some(node) = cluster.nodes.get_mut(node_name) {
                node.spec.unschedulable = false;
            }
            scheduler.retry_pending_pods(cluster, now);
        });
    }

    /// Adds or replaces an auxiliary resource.
    pub fn add_resource(&mut self, mut resource: AuxiliaryResource, now: f64) {
        resource.metadata.creation_timestamp = now;
        info!("Adding resource {}", resource.key());
        self.mutate(|cluster, _| {
            cluster.resources.insert(resource.key(), resource);
        });
    }

    /// Creates the job and places `completions` pods for it.
    pub fn create_job(&mut self, mut job: Job, now: f64) {
        let job_name = job.metadata.name.clone();
        if self.cluster().jobs.contains_key(&job_name) {
            warn!("Create: job {:?} already exists", job_name);
            return;
        }
        job.metadata.creation_timestamp = now;
        job.status = Default::default();

        let pods: Vec<Pod> = (0..job.spec.completions)
            .map(|idx| {
                let mut pod = Pod::from_template(&format!("{}-{}", job_name, idx), &job.spec.template);
                pod.metadata
                    .labels
                    .insert("job-name".to_string(), job_name.clone());
                pod.metadata.owner_reference = Some(OwnerReference::job(&job_name));
                pod
            })
            .collect();
        job.status.pod_names = pods.iter().map(|pod| pod.metadata.name.clone()).collect();

        let current = self.cluster();
        if let Some(taken) = job
            .status
            .pod_names
            .iter()
            .find(|name| current.pods.contains_key(*name))
        {
            warn!("Create: job {:?} would replace existing pod {:?}", job_name, taken);
            return;
        }

        self.mutate(|cluster, scheduler| {
            cluster.jobs.insert(job_name.clone(), job);
            scheduler.place_pods(pods, cluster, now);
        });
    }

    /// Running pods of the job succeed. Pending pods are left as they are.
    pub fn complete_job(&mut self, job_name: &str, now: f64) {
        let Some(job) = self.cluster().jobs.get(job_name).cloned() else {
            warn!("Complete: job {:?} does not exist", job_name);
            return;
        };
        let was_complete = job.status.complete;
        let complete = self.mutate(|cluster, _| {
            for pod_name in job.status.pod_names.iter() {
                let Some(pod) = cluster.pods.get_mut(pod_name) else {
                    continue;
                };
                if pod.is_running() {
                    pod.status.phase = PodPhase::Succeeded;
                    pod.update_condition("False", PodConditionType::Ready, Some("PodCompleted"), None, now);
                    pod.record_event(
                        PodEventType::Normal,
                        "Completed",
                        format!("Pod {} of job {} completed", pod_name, job_name),
                        now,
                    );
                }
            }
            cluster.refresh_job(job_name);
            cluster.jobs.get(job_name).map_or(false, |job| job.status.complete)
        });
        if complete && !was_complete {
            info!("Job {:?} completed", job_name);
            self.metrics_collector.borrow_mut().jobs_completed += 1;
        }
    }

    /// Sets `labels` and removes `remove` keys, then retries pending pods.
    pub fn update_node_labels(&mut self, node_name: &str, labels: Labels, remove: &[String], now: f64) {
        if !self.node_exists(node_name, "Update labels") {
            return;
        }
        self.mutate(|cluster, scheduler| {
            if let Some(node) = cluster.nodes.get_mut(node_name) {
                node.metadata.labels.extend(labels);
                for key in remove.iter() {
                    node.metadata.labels.remove(key);
                }
            }
            scheduler.retry_pending_pods(cluster, now);
        });
    }

    /// Replaces the taint list of the node. Pods already running there are not affected.
    pub fn set_node_taints(&mut self, node_name: &str, taints: Vec<Taint>, now: f64) {
        if !self.node_exists(node_name, "Set taints") {
            return;
        }
        self.mutate(|cluster, scheduler| {
            if let Some(node) = cluster.nodes.get_mut(node_name) {
                node.spec.taints = taints;
            }
            scheduler.retry_pending_pods(cluster, now);
        });
    }
}
