pub mod config;
pub mod core;
pub mod metrics;
pub mod scenario;
pub mod simulation_callbacks;
pub mod simulator;
pub mod test_util;
