//! Scenario data: ordered step tables interpreted by the scenario engine, and the transient
//! values the engine exposes while running them.

use serde::{Deserialize, Serialize};

use crate::core::api_server::Action;

/// Phases shared by every scenario kind.
#[derive(Default, Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    #[default]
    Idle,
    Submitted,
    Admitted,
    Persisted,
    Reconciling,
    Scheduled,
    NodeActing,
    Complete,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScenarioStep {
    /// Delay from the start of the run, not from the previous step.
    pub delay_ms: u64,
    pub phase: ScenarioPhase,
    #[serde(default)]
    pub message: String,
    /// Side effect applied when the step fires.
    #[serde(default)]
    pub action: Option<Action>,
}

impl ScenarioStep {
    pub fn new(delay_ms: u64, phase: ScenarioPhase, message: &str) -> Self {
        Self {
            delay_ms,
            phase,
            message: message.to_string(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScenarioDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioDefinition {
    pub fn new(name: &str, description: &str, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            steps,
        }
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.steps.iter().map(|step| step.delay_ms).max().unwrap_or(0)
    }
}

/// Current run. Replaced as a whole on every step, reset to idle on stop or finish.
#[derive(Default, Debug, Serialize, Clone, PartialEq)]
pub struct ScenarioRun {
    pub scenario: Option<String>,
    pub phase: ScenarioPhase,
    pub message: String,
    pub generation: u64,
}

/// What the view layer renders after every engine tick.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ScenarioDisplay {
    pub phase: ScenarioPhase,
    pub message: String,
    pub scenario_name: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PhaseTransition {
    pub time: f64,
    pub scenario: String,
    pub phase: ScenarioPhase,
    pub message: String,
    pub generation: u64,
}
