pub mod builtin;
pub mod definition;
pub mod engine;
