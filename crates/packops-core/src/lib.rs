pub mod action;
pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod io;
pub mod orchestrator;
pub mod outcome;
pub mod paths;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod reward;
pub mod run_context;
pub mod store;
pub mod task_state;
pub mod telemetry;
pub mod trainer;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{PackopsError, Result};
