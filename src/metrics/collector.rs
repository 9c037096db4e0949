//! Implements centralized storage for metrics. Any component may access this component to
//! report metrics about pods, nodes and scenario runs.

use average::{concatenate, Estimate, Max, Mean, Min, Variance};

concatenate!(
    Estimator,
    [Min, min],
    [Max, max],
    [Mean, mean],
    [Variance, population_variance]
);

#[derive(Default)]
pub struct EstimatorWrapper {
    estimator: Estimator,
}

impl std::fmt::Debug for EstimatorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("min", &self.min())
            .field("max", &self.max())
            .field("mean", &self.mean())
            .field("population_variance", &self.population_variance())
            .finish()
    }
}

impl EstimatorWrapper {
    pub fn new() -> Self {
        Self {
            estimator: Estimator::new(),
        }
    }

    pub fn add(&mut self, value: f64) {
        self.estimator.add(value);
    }

    pub fn min(&self) -> f64 {
        self.estimator.min()
    }

    pub fn max(&self) -> f64 {
        self.estimator.max()
    }

    pub fn mean(&self) -> f64 {
        self.estimator.mean()
    }

    pub fn population_variance(&self) -> f64 {
        self.estimator.population_variance()
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// The number of pods bound to a node, including pods bound on a retry.
    pub pods_scheduled: u64,
    /// The number of pods left pending because no node satisfied constraints and capacity.
    pub pods_unschedulable: u64,
    /// The number of pods removed by scale down, eviction or explicit removal.
    pub pods_removed: u64,
    /// The number of pods which failed because their node failed.
    pub pods_failed: u64,
    pub node_failures: u64,
    pub node_evictions: u64,
    pub jobs_completed: u64,

    // Scenario engine metrics
    pub scenario_runs_started: u64,
    pub scenario_runs_completed: u64,
    pub scenario_runs_cancelled: u64,
    /// Step callbacks which fired after their run had been cancelled or replaced.
    pub stale_callbacks_dropped: u64,

    /// Wall-clock time in seconds spent in one reconcile call.
    pub reconcile_latency_stats: EstimatorWrapper,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn increment_reconcile_latency(&mut self, value: f64) {
        self.reconcile_latency_stats.add(value);
    }
}
