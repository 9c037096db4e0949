//! Type definition for Service: a label selector over pods with a materialized member set.

use serde::{Deserialize, Serialize};

use crate::core::common::{Labels, ObjectMeta};

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServiceSpec {
    /// An empty selector selects no pods.
    #[serde(default)]
    pub selector: Labels,
    #[serde(default)]
    pub port: u16,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServiceStatus {
    /// Recomputed from scratch whenever pod membership could have changed. Sorted.
    #[serde(default)]
    pub pod_names: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
    #[serde(default)]
    pub status: ServiceStatus,
}

impl Service {
    pub fn new(name: &str, selector: Labels) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec: ServiceSpec { selector, port: 80 },
            status: Default::default(),
        }
    }
}
