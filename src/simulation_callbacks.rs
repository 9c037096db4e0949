//! Simulation callbacks interface and implementations to define how simulator should behave on start,
//! step, finish and when it should stop running.

use log::{error, info};

use crate::{metrics::printer::print_metrics, simulator::KubeplaySimulation};

pub trait SimulationCallbacks {
    /// Runs before starting a simulation run.
    fn on_simulation_start(&mut self, _sim: &mut KubeplaySimulation) {}

    /// Runs on each step of a simulation run, returns false if the simulation must be stopped.
    fn on_step(&mut self, _sim: &mut KubeplaySimulation) -> bool {
        true
    }

    /// Runs upon the completion of a simulation run, returns results of this run.
    fn on_simulation_finish(&mut self, _sim: &mut KubeplaySimulation) {}
}

/// Starts one scenario and runs until the scenario engine returns to idle.
pub struct RunUntilScenarioIdleCallbacks {
    scenario: String,
    last_logged: usize,
}

impl RunUntilScenarioIdleCallbacks {
    pub fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            last_logged: 0,
        }
    }

    fn log_new_transitions(&mut self, sim: &KubeplaySimulation) {
        let engine = sim.scenario_engine.borrow();
        for transition in engine.history().iter().skip(self.last_logged) {
            info!(
                "[{:.3}] {} -> {:?}: {}",
                transition.time, transition.scenario, transition.phase, transition.message
            );
        }
        self.last_logged = engine.history().len();
    }
}

impl SimulationCallbacks for RunUntilScenarioIdleCallbacks {
    fn on_simulation_start(&mut self, sim: &mut KubeplaySimulation) {
        sim.set_scenario(&self.scenario);
        sim.start_scenario();
    }

    fn on_step(&mut self, sim: &mut KubeplaySimulation) -> bool {
        self.log_new_transitions(sim);
        sim.scenario_is_running()
    }

    fn on_simulation_finish(&mut self, sim: &mut KubeplaySimulation) {
        self.log_new_transitions(sim);
        if let Some(printer_config) = sim.config.metrics_printer.as_ref() {
            if let Err(err) = print_metrics(sim.metrics_collector.clone(), printer_config) {
                error!("Failed to print metrics: {}", err);
            }
        }
    }
}
