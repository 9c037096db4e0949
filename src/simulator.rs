//! Represents entry point for a simulated session: one cluster repository, scheduler, api server and
//! scenario engine driven by a dslab simulation. Dropping the session drops all of its state.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use log::info;

use dslab_core::simulation::Simulation;

use crate::config::SimulationConfig;
use crate::core::api_server::KubeApiServer;
use crate::core::cluster::ClusterSnapshot;
use crate::core::cluster_repository::ClusterRepository;
use crate::core::scheduler::scheduler::Scheduler;
use crate::metrics::collector::MetricsCollector;
use crate::scenario::builtin::builtin_scenarios;
use crate::scenario::definition::ScenarioDisplay;
use crate::scenario::engine::ScenarioEngine;
use crate::simulation_callbacks::SimulationCallbacks;

pub struct KubeplaySimulation {
    pub config: Rc<SimulationConfig>,
    pub sim: Simulation,

    pub repository: Rc<RefCell<ClusterRepository>>,
    pub scheduler: Rc<RefCell<Scheduler>>,
    pub api_server: Rc<RefCell<KubeApiServer>>,
    pub scenario_engine: Rc<RefCell<ScenarioEngine>>,

    pub metrics_collector: Rc<RefCell<MetricsCollector>>,
}

impl KubeplaySimulation {
    pub fn new(config: Rc<SimulationConfig>) -> Self {
        info!(
            "Creating kubeplay simulation {:?} with seed {}",
            config.sim_name, config.seed
        );

        let mut sim = Simulation::new(config.seed);
        let metrics_collector = Rc::new(RefCell::new(MetricsCollector::new()));

        let repository = Rc::new(RefCell::new(ClusterRepository::default()));
        let scheduler = Rc::new(RefCell::new(Scheduler::new(
            &config.scheduler,
            config.seed,
            metrics_collector.clone(),
        )));
        let api_server = Rc::new(RefCell::new(KubeApiServer::new(
            repository.clone(),
            scheduler.clone(),
            metrics_collector.clone(),
        )));

        // Register simulator components
        let scenario_engine_component_name = "scenario_engine";
        let scenario_engine_context = sim.create_context(scenario_engine_component_name);
        let mut engine = ScenarioEngine::new(
            builtin_scenarios(),
            config.scenario_auto_stop_delay_ms,
            api_server.clone(),
            scenario_engine_context,
            metrics_collector.clone(),
        );
        for scenario in config.scenarios.iter() {
            engine.register(scenario.clone());
        }
        let scenario_engine = Rc::new(RefCell::new(engine));
        sim.add_handler(scenario_engine_component_name, scenario_engine.clone());

        let mut simulation = KubeplaySimulation {
            config,
            sim,
            repository,
            scheduler,
            api_server,
            scenario_engine,
            metrics_collector,
        };
        simulation.initialize_cluster();
        simulation
    }

    /// Loads the fixture cluster and records it as the known-good snapshot.
    fn initialize_cluster(&mut self) {
        let now = self.sim.time();
        let config = self.config.clone();
        let mut api_server = self.api_server.borrow_mut();

        let mut total_nodes = 0;
        for node_group in config.default_cluster.iter().flatten() {
            for node in node_group.nodes(&mut total_nodes) {
                api_server.add_node(node, now);
            }
        }
        for resource in config.resources.iter() {
            api_server.add_resource(resource.clone(), now);
        }
        for service in config.services.iter() {
            api_server.create_service(service.clone(), now);
        }
        for deployment in config.deployments.iter() {
            api_server.create_deployment(deployment.clone(), now);
        }
        for job in config.jobs.iter() {
            api_server.create_job(job.clone(), now);
        }

        self.repository.borrow_mut().mark_known_good();
        let cluster = self.repository.borrow().snapshot();
        info!(
            "Cluster initialized with {} nodes, {} pods, {} deployments, {} services",
            cluster.nodes.len(),
            cluster.pods.len(),
            cluster.deployments.len(),
            cluster.services.len()
        );
    }

    pub fn cluster(&self) -> Rc<ClusterSnapshot> {
        self.repository.borrow().snapshot()
    }

    pub fn set_scenario(&mut self, name: &str) {
        self.scenario_engine.borrow_mut().set_scenario(name);
    }

    pub fn start_scenario(&mut self) {
        self.scenario_engine.borrow_mut().start();
    }

    pub fn stop_scenario(&mut self) {
        self.scenario_engine.borrow_mut().stop();
    }

    pub fn scenario_display(&self) -> ScenarioDisplay {
        self.scenario_engine.borrow().display()
    }

    pub fn scenario_is_running(&self) -> bool {
        self.scenario_engine.borrow().is_running()
    }

    pub fn run_with_callbacks(&mut self, mut callbacks: Box<dyn SimulationCallbacks>) {
        callbacks.on_simulation_start(self);

        let t = Instant::now();
        while callbacks.on_step(self) {
            if !self.sim.step() {
                break;
            }
        }
        let duration = t.elapsed().as_secs_f64();
        info!(
            "Processed {} events in {:.2?}s ({:.0} events/s)",
            self.sim.event_count(),
            duration,
            self.sim.event_count() as f64 / duration
        );
        info!("Finished at {}", self.sim.time());

        callbacks.on_simulation_finish(self);
    }

    pub fn run_until_no_events(&mut self) {
        let t = Instant::now();
        self.sim.step_until_no_events();
        let duration = t.elapsed().as_secs_f64();
        info!(
            "Processed {} events in {:.2?}s ({:.0} events/s)",
            self.sim.event_count(),
            duration,
            self.sim.event_count() as f64 / duration
        );
    }

    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        self.sim.step_for_duration(duration)
    }

    /// Returns `true` if there could be more pending events and `false` otherwise.
    pub fn step_until_time(&mut self, time: f64) -> bool {
        self.sim.step_until_time(time)
    }
}
