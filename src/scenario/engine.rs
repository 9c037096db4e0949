//! Scenario engine: a cancellable single-flow phase sequencer.
//!
//! Starting a run emits one self event per step at its absolute delay plus a trailing auto-stop
//! event. All of them carry the run generation. Cancelling a run only bumps the generation, so every
//! event of the old run becomes a no-op on arrival and the whole run is invalidated at once.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use dslab_core::{cast, log_debug, log_info, Event, EventHandler, SimulationContext};
use log::warn;

use crate::core::api_server::KubeApiServer;
use crate::core::events::{FinishScenarioRun, RunScenarioStep};
use crate::metrics::collector::MetricsCollector;
use crate::scenario::definition::{
    PhaseTransition, ScenarioDefinition, ScenarioDisplay, ScenarioPhase, ScenarioRun,
};

pub struct ScenarioEngine {
    scenarios: BTreeMap<String, ScenarioDefinition>,
    /// Scenario which `start` runs.
    selected: Option<String>,
    run: ScenarioRun,
    /// Incremented on every start and cancellation.
    generation: u64,
    auto_stop_delay_ms: u64,
    history: Vec<PhaseTransition>,

    api_server: Rc<RefCell<KubeApiServer>>,

    ctx: SimulationContext,

    metrics_collector: Rc<RefCell<MetricsCollector>>,
}

impl ScenarioEngine {
    pub fn new(
        scenarios: Vec<ScenarioDefinition>,
        auto_stop_delay_ms: u64,
        api_server: Rc<RefCell<KubeApiServer>>,
        ctx: SimulationContext,
        metrics_collector: Rc<RefCell<MetricsCollector>>,
    ) -> Self {
        Self {
            scenarios: scenarios
                .into_iter()
                .map(|scenario| (scenario.name.clone(), scenario))
                .collect(),
            selected: None,
            run: Default::default(),
            generation: 0,
            auto_stop_delay_ms,
            history: Default::default(),
            api_server,
            ctx,
            metrics_collector,
        }
    }

    /// Adds the definition, replacing a scenario with the same name.
    pub fn register(&mut self, scenario: ScenarioDefinition) {
        self.scenarios.insert(scenario.name.clone(), scenario);
    }

    pub fn scenario_names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    pub fn get_scenario(&self, name: &str) -> Option<&ScenarioDefinition> {
        self.scenarios.get(name)
    }

    /// Cancels an active run and selects the scenario for the next `start`.
    pub fn set_scenario(&mut self, name: &str) {
        self.cancel_active_run();
        if !self.scenarios.contains_key(name) {
            warn!("Selected scenario {:?} is not defined", name);
        }
        self.selected = Some(name.to_string());
    }

    /// Cancels an active run and starts the selected scenario from its first step.
    pub fn start(&mut self) {
        self.cancel_active_run();

        let Some(name) = self.selected.clone() else {
            warn!("No scenario selected, nothing to start");
            return;
        };
        let Some(scenario) = self.scenarios.get(&name) else {
            warn!("Scenario {:?} is not defined, nothing to start", name);
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        for (step, definition) in scenario.steps.iter().enumerate() {
            self.ctx.emit_self(
                RunScenarioStep { generation, step },
                definition.delay_ms as f64 / 1000.0,
            );
        }
        let finish_delay_ms = scenario.max_delay_ms() + self.auto_stop_delay_ms;
        self.ctx.emit_self(
            FinishScenarioRun { generation },
            finish_delay_ms as f64 / 1000.0,
        );

        // the earliest step, steps of the table are not required to be sorted
        let first_step = scenario.steps.iter().min_by_key(|step| step.delay_ms);
        let (phase, message) = match first_step {
            Some(step) => (step.phase, step.message.clone()),
            None => (ScenarioPhase::Submitted, String::new()),
        };
        self.run = ScenarioRun {
            scenario: Some(name.clone()),
            phase,
            message,
            generation,
        };
        self.metrics_collector.borrow_mut().scenario_runs_started += 1;
        log_info!(
            self.ctx,
            "Scenario {:?} started with {} steps, generation {}",
            name,
            scenario.steps.len(),
            generation
        );
    }

    /// Invalidates every pending event of the current run and resets to idle. Safe when idle.
    pub fn stop(&mut self) {
        self.cancel_active_run();
    }

    fn cancel_active_run(&mut self) {
        self.generation += 1;
        if let Some(scenario) = self.run.scenario.take() {
            self.metrics_collector.borrow_mut().scenario_runs_cancelled += 1;
            log_info!(self.ctx, "Scenario {:?} cancelled", scenario);
        }
        self.run = ScenarioRun {
            generation: self.generation,
            ..Default::default()
        };
    }

    pub fn is_running(&self) -> bool {
        self.run.scenario.is_some()
    }

    pub fn current_run(&self) -> &ScenarioRun {
        &self.run
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn display(&self) -> ScenarioDisplay {
        ScenarioDisplay {
            phase: self.run.phase,
            message: self.run.message.clone(),
            scenario_name: self.selected.clone(),
        }
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    fn is_stale(&self, generation: u64) -> bool {
        if generation == self.generation && self.run.scenario.is_some() {
            return false;
        }
        self.metrics_collector.borrow_mut().stale_callbacks_dropped += 1;
        log_debug!(
            self.ctx,
            "Dropped callback of generation {}, current generation is {}",
            generation,
            self.generation
        );
        true
    }

    fn record_transition(&mut self, time: f64) {
        self.history.push(PhaseTransition {
            time,
            scenario: self.run.scenario.clone().unwrap_or_default(),
            phase: self.run.phase,
            message: self.run.message.clone(),
            generation: self.run.generation,
        });
    }

    fn run_step(&mut self, time: f64, generation: u64, step: usize) {
        if self.is_stale(generation) {
            return;
        }
        let Some(name) = self.run.scenario.clone() else {
            return;
        };
        let Some(definition) = self
            .scenarios
            .get(&name)
            .and_then(|scenario| scenario.steps.get(step))
            .cloned()
        else {
            return;
        };

        self.run = ScenarioRun {
            scenario: Some(name.clone()),
            phase: definition.phase,
            message: definition.message.clone(),
            generation,
        };
        self.record_transition(time);
        log_debug!(
            self.ctx,
            "Scenario {:?} step {} entered phase {:?}: {}",
            name,
            step,
            definition.phase,
            definition.message
        );

        // Result of the side effect is not inspected, missing objects are no-ops.
        if let Some(action) = definition.action.as_ref() {
            self.api_server.borrow_mut().apply(action, time);
        }
    }

    fn finish_run(&mut self, time: f64, generation: u64) {
        if self.is_stale(generation) {
            return;
        }
        let scenario = self.run.scenario.take().unwrap_or_default();
        self.run = ScenarioRun {
            generation,
            ..Default::default()
        };
        self.history.push(PhaseTransition {
            time,
            scenario: scenario.clone(),
            phase: ScenarioPhase::Idle,
            message: String::new(),
            generation,
        });
        self.metrics_collector.borrow_mut().scenario_runs_completed += 1;
        log_info!(self.ctx, "Scenario {:?} finished", scenario);
    }
}

impl EventHandler for ScenarioEngine {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            RunScenarioStep { generation, step } => {
                self.run_step(event.time, generation, step);
            }
            FinishScenarioRun { generation } => {
                self.finish_run(event.time, generation);
            }
        })
    }
}
