//! Workflow infrastructure implementations

mod executor_impl;
pub mod steps;

pub use executor_impl::{GraphExecutor, GraphExecutorConfig};
