//! Observability infrastructure

pub mod metrics;

pub use metrics::{record_degradation, record_step, record_workflow_run};
