//! Snapshot of all simulated cluster objects and the derived views computed from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::{OwnerKind, RuntimeResources};
use crate::core::constraints::{selector_matches, PlacementConstraints};
use crate::core::deployment::Deployment;
use crate::core::job::{AuxiliaryResource, Job};
use crate::core::node::Node;
use crate::core::pod::{Pod, PodPhase};
use crate::core::service::Service;

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusterSnapshot {
    // <Node name, Node>
    pub nodes: BTreeMap<String, Node>,
    // <Pod name, Pod>
    pub pods: BTreeMap<String, Pod>,
    pub deployments: BTreeMap<String, Deployment>,
    pub services: BTreeMap<String, Service>,
    pub jobs: BTreeMap<String, Job>,
    // <"Kind/name", resource>
    pub resources: BTreeMap<String, AuxiliaryResource>,
}

impl ClusterSnapshot {
    /// Sum of requests of non-terminated pods bound to the node.
    pub fn node_usage(&self, node_name: &str) -> RuntimeResources {
        let mut used = RuntimeResources::default();
        for pod in self.pods_on_node(node_name) {
            used.add(&pod.spec.resources.requests);
        }
        used
    }

    /// Non-terminated pods bound to the node.
    pub fn pods_on_node<'a>(&'a self, node_name: &'a str) -> impl Iterator<Item = &'a Pod> + 'a {
        self.pods.values().filter(move |pod| {
            !pod.is_terminated() && pod.status.node_name.as_deref() == Some(node_name)
        })
    }

    /// Whether `requests` fit into the free resources of the node.
    pub fn fits(&self, node_name: &str, requests: &RuntimeResources) -> bool {
        match self.nodes.get(node_name) {
            Some(node) => self
                .node_usage(node_name)
                .fits_with(requests, &node.status.capacity),
            None => false,
        }
    }

    /// Constraints the pod has to be placed with: those of its owning deployment, else only its own
    /// tolerations.
    pub fn placement_for(&self, pod: &Pod) -> PlacementConstraints {
        let mut placement = pod
            .metadata
            .owner_reference
            .as_ref()
            .filter(|owner| owner.kind == OwnerKind::Deployment)
            .and_then(|owner| self.deployments.get(&owner.name))
            .map(|deployment| deployment.spec.placement.clone())
            .unwrap_or_default();
        placement
            .tolerations
            .extend(pod.spec.tolerations.iter().cloned());
        placement
    }

    /// Rebuilds the member list and the ready counters of a deployment from pod owner references.
    /// Keeps the existing order of members, appends unknown owned pods at the tail.
    pub fn refresh_deployment(&mut self, deployment_name: &str) {
        let Some(deployment) = self.deployments.get(deployment_name) else {
            return;
        };
        let mut pod_names: Vec<String> = deployment
            .status
            .pod_names
            .iter()
            .filter(|name| {
                self.pods
                    .get(*name)
                    .map_or(false, |pod| pod.is_owned_by(OwnerKind::Deployment, deployment_name))
            })
            .cloned()
            .collect();
        for pod in self.pods.values() {
            if pod.is_owned_by(OwnerKind::Deployment, deployment_name) && !pod_names.contains(&pod.metadata.name) {
                pod_names.push(pod.metadata.name.clone());
            }
        }
        let ready = pod_names
            .iter()
            .filter(|name| self.pods.get(*name).map_or(false, |pod| pod.is_running()))
            .count() as u32;

        if let Some(deployment) = self.deployments.get_mut(deployment_name) {
            deployment.status.replicas = pod_names.len() as u32;
            deployment.status.ready_replicas = ready;
            deployment.status.available_replicas = ready;
            deployment.status.pod_names = pod_names;
        }
    }

    pub fn refresh_job(&mut self, job_name: &str) {
        let Some(job) = self.jobs.get(job_name) else {
            return;
        };
        let pod_names: Vec<String> = job
            .status
            .pod_names
            .iter()
            .filter(|name| {
                self.pods
                    .get(*name)
                    .map_or(false, |pod| pod.is_owned_by(OwnerKind::Job, job_name))
            })
            .cloned()
            .collect();
        let count_in = |phase: PodPhase| {
            pod_names
                .iter()
                .filter(|name| self.pods.get(*name).map_or(false, |p| p.status.phase == phase))
                .count() as u32
        };
        let active = count_in(PodPhase::Running) + count_in(PodPhase::Pending);
        let succeeded = count_in(PodPhase::Succeeded);

        if let Some(job) = self.jobs.get_mut(job_name) {
            job.status.active = active;
            job.status.succeeded = succeeded;
            job.status.complete = succeeded >= job.spec.completions;
            job.status.pod_names = pod_names;
        }
    }

    /// Materialized view refresh: every service's member set is recomputed from scratch as the running
    /// pods matching its selector.
    pub fn refresh_services(&mut self) {
        let pods = &self.pods;
        for service in self.services.values_mut() {
            if service.spec.selector.is_empty() {
                service.status.pod_names.clear();
                continue;
            }
            service.status.pod_names = pods
                .values()
                .filter(|pod| pod.is_running())
                .filter(|pod| selector_matches(&service.spec.selector, &pod.metadata.labels))
                .map(|pod| pod.metadata.name.clone())
                .collect();
        }
    }

    /// Recomputes every derived view. Called after any operation which could change pod membership.
    pub fn refresh_derived(&mut self) {
        let deployments: Vec<String> = self.deployments.keys().cloned().collect();
        for name in deployments.iter() {
            self.refresh_deployment(name);
        }
        let jobs: Vec<String> = self.jobs.keys().cloned().collect();
        for name in jobs.iter() {
            self.refresh_job(name);
        }
        self.refresh_services();
    }

    /// Every deployment has a running member to copy new pods from.
    pub fn every_deployment_has_running_member(&self) -> bool {
        self.deployments.values().all(|deployment| {
            deployment
                .status
                .pod_names
                .iter()
                .any(|name| self.pods.get(name).map_or(false, |pod| pod.is_running()))
        })
    }

    /// Programmer errors which must never be observable in a published snapshot.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = vec![];
        for pod in self.pods.values() {
            match (pod.status.phase, &pod.status.node_name) {
                (PodPhase::Running, None) => {
                    violations.push(format!("pod {:?} is running without a node", pod.metadata.name))
                }
                (PodPhase::Pending, Some(node)) => violations.push(format!(
                    "pod {:?} is pending but bound to node {:?}",
                    pod.metadata.name, node
                )),
                _ => {}
            }
        }
        for deployment in self.deployments.values() {
            if deployment.status.ready_replicas > deployment.spec.replicas {
                violations.push(format!(
                    "deployment {:?} has {} ready replicas but desires {}",
                    deployment.metadata.name,
                    deployment.status.ready_replicas,
                    deployment.spec.replicas
                ));
            }
        }
        violations
    }
}
