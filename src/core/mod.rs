pub mod api_server;
pub mod cluster;
pub mod cluster_repository;
pub mod common;
pub mod constraints;
pub mod deployment;
pub mod events;
pub mod job;
pub mod node;
pub mod pod;
pub mod scheduler;
pub mod service;
