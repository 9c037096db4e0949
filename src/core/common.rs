//! Common type definitions shared by all cluster objects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Labels and label selectors. Ordered so that any iteration over them is deterministic.
pub type Labels = BTreeMap<String, String>;

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    /// Workload which owns this object, if any.
    #[serde(default)]
    pub owner_reference: Option<OwnerReference>,
    #[serde(default)]
    pub creation_timestamp: f64,
}

impl ObjectMeta {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Deployment,
    Job,
}

/// Deployments and jobs live in separate namespaces, so an owner is identified by kind and name.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    pub kind: OwnerKind,
    pub name: String,
}

impl OwnerReference {
    pub fn deployment(name: &str) -> Self {
        Self {
            kind: OwnerKind::Deployment,
            name: name.to_string(),
        }
    }

    pub fn job(name: &str) -> Self {
        Self {
            kind: OwnerKind::Job,
            name: name.to_string(),
        }
    }
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeResources {
    pub cpu: u32, // in millicores
    pub ram: u64, // in megabytes
}

impl RuntimeResources {
    pub fn new(cpu: u32, ram: u64) -> Self {
        Self { cpu, ram }
    }

    /// True if `self + other` still fits into `capacity` in both dimensions.
    pub fn fits_with(&self, other: &RuntimeResources, capacity: &RuntimeResources) -> bool {
        self.cpu as u64 + other.cpu as u64 <= capacity.cpu as u64
            && self.ram + other.ram <= capacity.ram
    }

    pub fn add(&mut self, other: &RuntimeResources) {
        self.cpu += other.cpu;
        self.ram += other.ram;
    }
}
