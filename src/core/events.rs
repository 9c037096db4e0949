//! Events which the scenario engine emits to itself. Every event carries the generation of the run
//! which scheduled it, events of a cancelled or replaced run are dropped on arrival.

use serde::Serialize;

/// Fires one step of a scenario run at `delay_ms` after the run started.
#[derive(Serialize, Clone)]
pub struct RunScenarioStep {
    pub generation: u64,
    pub step: usize,
}

/// Trailing auto-stop of a run, fires after its last step.
#[derive(Serialize, Clone)]
pub struct FinishScenarioRun {
    pub generation: u64,
}
