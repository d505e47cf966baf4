//! Engine metrics
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding application.

use std::time::Duration;

use metrics::{counter, histogram};

/// Record a finished workflow run
pub fn record_workflow_run(strategy: &str, outcome: &str, duration: Duration) {
    let labels = [
        ("strategy", strategy.to_string()),
        ("outcome", outcome.to_string()),
    ];

    counter!("rag_workflow_runs_total", &labels).increment(1);
    histogram!("rag_workflow_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record one step execution
pub fn record_step(kind: &str, success: bool, duration: Duration) {
    let labels = [
        ("kind", kind.to_string()),
        ("status", if success { "success" } else { "error" }.to_string()),
    ];

    counter!("rag_step_executions_total", &labels).increment(1);
    histogram!("rag_step_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record a failure absorbed by a step
pub fn record_degradation(kind: &str) {
    counter!("rag_degradations_total", "kind" => kind.to_string()).increment(1);
}
