//! Type definition for Deployment-like workloads: a desired number of identical pods.

use serde::{Deserialize, Serialize};

use crate::core::common::{Labels, ObjectMeta};
use crate::core::constraints::PlacementConstraints;
use crate::core::pod::PodTemplate;

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeploymentSpec {
    pub replicas: u32,
    /// Defines pod membership for services. New pods always carry these labels.
    #[serde(default)]
    pub selector: Labels,
    /// Fixture used only when the workload has to be bootstrapped from zero pods.
    #[serde(default)]
    pub template: Option<PodTemplate>,
    #[serde(default)]
    pub placement: PlacementConstraints,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeploymentStatus {
    /// Member pods, oldest first. Scale down removes from the tail.
    #[serde(default)]
    pub pod_names: Vec<String>,
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub ready_replicas: u32,
    #[serde(default)]
    pub available_replicas: u32,
    /// Monotonically incrementing counter used in unique pod names.
    #[serde(default)]
    pub created_total: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
    #[serde(default)]
    pub status: DeploymentStatus,
}

impl Deployment {
    pub fn new(name: &str, replicas: u32, selector: Labels) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec: DeploymentSpec {
                replicas,
                selector,
                template: None,
                placement: Default::default(),
            },
            status: Default::default(),
        }
    }

    pub fn next_pod_name(&mut self) -> String {
        let name = format!("{}-{}", self.metadata.name, self.status.created_total);
        self.status.created_total += 1;
        name
    }
}
