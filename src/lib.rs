pub mod config;
pub mod engine;
pub mod errors;
pub mod store;
pub mod workflow;
pub mod workspace;
