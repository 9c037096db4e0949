pub mod interface;
pub mod plugin;
pub mod round_robin;
pub mod scheduler;
