//! Run-to-completion jobs and the auxiliary resource kinds which only need to exist in the cluster.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::ObjectMeta;
use crate::core::pod::PodTemplate;

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct JobSpec {
    pub completions: u32,
    pub template: PodTemplate,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct JobStatus {
    #[serde(default)]
    pub pod_names: Vec<String>,
    #[serde(default)]
    pub active: u32,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub complete: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Job {
    pub metadata: ObjectMeta,
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
    PersistentVolumeClaim,
    Ingress,
    Namespace,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuxiliaryResource {
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl AuxiliaryResource {
    /// Key in the cluster snapshot, names are unique per kind.
    pub fn key(&self) -> String {
        format!("{:?}/{}", self.kind, self.metadata.name)
    }
}
