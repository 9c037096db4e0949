//! Type definition for Pod primitive in k8s cluster

use serde::{Deserialize, Serialize};

use crate::core::common::{Labels, ObjectMeta, OwnerKind, RuntimeResources};
use crate::core::node::TaintEffect;

#[derive(Default, Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Resources {
    #[serde(default)]
    pub limits: RuntimeResources,
    pub requests: RuntimeResources,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum TolerationOperator {
    #[default]
    Equal,
    Exists,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Toleration {
    /// Empty key with `Exists` operator tolerates every taint.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub operator: TolerationOperator,
    #[serde(default)]
    pub value: String,
    /// None matches all effects.
    #[serde(default)]
    pub effect: Option<TaintEffect>,
}

#[derive(Default, Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PodSpec {
    /// Simplified: instead of vector of containers - one container with resources
    pub resources: Resources,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
}

/// Static shape of pods created for a workload: labels and resource requests.
#[derive(Default, Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PodTemplate {
    #[serde(default)]
    pub labels: Labels,
    pub requests: RuntimeResources,
}

#[derive(Default, Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum PodConditionType {
    // All init steps are done
    Initialized,
    // Pod is able to serve requests
    Ready,
    // All containers in the pod are ready
    ContainersReady,
    // Pod is bound to a node, or failed to be bound with a reason
    PodScheduled,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PodCondition {
    // True, False or Unknown
    pub status: String,
    pub condition_type: PodConditionType,
    pub reason: Option<String>,
    pub message: Option<String>,
    // Last event time the condition transit from one status to another.
    pub last_transition_time: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum PodEventType {
    Normal,
    Warning,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PodEvent {
    pub event_type: PodEventType,
    pub reason: String,
    pub message: String,
    pub timestamp: f64,
}

#[derive(Default, Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PodStatus {
    #[serde(default)]
    pub phase: PodPhase,
    /// None while the pod is pending.
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<PodCondition>,
    /// Append-only.
    #[serde(default)]
    pub events: Vec<PodEvent>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

impl Pod {
    pub fn new(name: &str, cpu: u32, ram: u64) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec: PodSpec {
                resources: Resources {
                    limits: RuntimeResources { cpu, ram },
                    requests: RuntimeResources { cpu, ram },
                },
                tolerations: Default::default(),
            },
            status: Default::default(),
        }
    }

    pub fn from_template(name: &str, template: &PodTemplate) -> Self {
        let mut pod = Pod::new(name, template.requests.cpu, template.requests.ram);
        pod.metadata.labels = template.labels.clone();
        pod
    }

    /// Inverse of `from_template`, used when an existing pod serves as the template for new ones.
    pub fn to_template(&self) -> PodTemplate {
        PodTemplate {
            labels: self.metadata.labels.clone(),
            requests: self.spec.resources.requests,
        }
    }

    pub fn update_condition(
        &mut self,
        status: &str,
        condition_type: PodConditionType,
        reason: Option<&str>,
        message: Option<String>,
        last_transition_time: f64,
    ) {
        let conditions = &mut self.status.conditions;
        match conditions
            .iter_mut()
            .find(|elem| elem.condition_type == condition_type)
        {
            Some(condition) => {
                if condition.status != status {
                    condition.last_transition_time = last_transition_time;
                }
                condition.status = status.to_string();
                condition.reason = reason.map(str::to_string);
                condition.message = message;
            }
            None => {
                conditions.push(PodCondition {
                    status: status.to_string(),
                    condition_type,
                    reason: reason.map(str::to_string),
                    message,
                    last_transition_time,
                });
            }
        }
    }

    // Ref to condition if it exists else None.
    pub fn get_condition(&self, condition_type: PodConditionType) -> Option<&PodCondition> {
        self.status
            .conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn record_event(
        &mut self,
        event_type: PodEventType,
        reason: &str,
        message: String,
        timestamp: f64,
    ) {
        self.status.events.push(PodEvent {
            event_type,
            reason: reason.to_string(),
            message,
            timestamp,
        });
    }

    pub fn is_running(&self) -> bool {
        self.status.phase == PodPhase::Running
    }

    /// Terminated pods do not hold node resources anymore.
    pub fn is_terminated(&self) -> bool {
        matches!(
            self.status.phase,
            PodPhase::Succeeded | PodPhase::Failed
        )
    }

    pub fn is_owned_by(&self, kind: OwnerKind, name: &str) -> bool {
        self.metadata
            .owner_reference
            .as_ref()
            .map_or(false, |owner| owner.kind == kind && owner.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::{Pod, PodConditionType, PodEventType};

    #[test]
    fn test_condition_is_updated_in_place() {
        let mut pod = Pod::new("pod_1", 100, 128);
        pod.update_condition(
            "False",
            PodConditionType::PodScheduled,
            Some("Unschedulable"),
            Some("0/1 nodes are available".to_string()),
            1.0,
        );
        pod.update_condition("True", PodConditionType::PodScheduled, None, None, 2.0);

        assert_eq!(1, pod.status.conditions.len());
        let condition = pod.get_condition(PodConditionType::PodScheduled).unwrap();
        assert_eq!("True", condition.status);
        assert_eq!(None, condition.reason);
        assert_eq!(2.0, condition.last_transition_time);
    }

    #[test]
    fn test_events_are_appended() {
        let mut pod = Pod::new("pod_1", 100, 128);
        pod.record_event(PodEventType::Warning, "FailedScheduling", "a".to_string(), 1.0);
        pod.record_event(PodEventType::Normal, "Scheduled", "b".to_string(), 2.0);
        let reasons: Vec<&str> = pod.status.events.iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(vec!["FailedScheduling", "Scheduled"], reasons);
    }
}
