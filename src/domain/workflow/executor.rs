//! Workflow executor trait and result types

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::WorkflowError;
use super::graph::WorkflowGraph;
use super::state::{WorkflowState, NO_RELEVANT_INFORMATION};
use super::step::Ports;
use crate::domain::iteration::TerminationReason;
use crate::domain::retrieval::Context;

/// Result of executing a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: Uuid,

    /// Graph that produced the answer
    pub workflow: String,

    /// Final answer text
    pub answer: String,

    /// Confidence reported by the strategy, when it has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// Why the strategy's loop ended
    pub termination: TerminationReason,

    /// Context the answer was generated from
    pub context: Context,

    /// Results from each executed step
    pub step_results: Vec<StepExecutionResult>,

    /// Failures absorbed along the way
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<String>,

    /// Total execution time in milliseconds
    pub execution_time_ms: u64,

    /// Whether the run stopped early on cancellation or deadline
    #[serde(default)]
    pub cancelled: bool,
}

impl WorkflowResult {
    /// Extract the result from a finished state
    pub fn from_state(
        workflow: impl Into<String>,
        state: WorkflowState,
        step_results: Vec<StepExecutionResult>,
        execution_time_ms: u64,
    ) -> Self {
        let answer = state
            .best_answer()
            .unwrap_or(NO_RELEVANT_INFORMATION)
            .to_string();

        Self {
            run_id: state.run_id,
            workflow: workflow.into(),
            answer,
            confidence: state.confidence,
            termination: state.iteration.termination(),
            context: state.context,
            step_results,
            degradations: state.degradations,
            execution_time_ms,
            cancelled: false,
        }
    }

    /// Mark the result as a partial answer after cancellation
    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self.termination = TerminationReason::Cancelled;
        self
    }

    /// Names of the executed steps, in order
    pub fn step_names(&self) -> Vec<&str> {
        self.step_results
            .iter()
            .map(|r| r.step_name.as_str())
            .collect()
    }

    /// Number of times a step ran
    pub fn step_count(&self, step_name: &str) -> usize {
        self.step_results
            .iter()
            .filter(|r| r.step_name == step_name)
            .count()
    }
}

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionResult {
    /// Node name in the graph
    pub step_name: String,

    /// Step kind
    pub kind: String,

    /// Whether the step executed successfully
    pub success: bool,

    /// Step output if successful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,

    /// Whether the failure was absorbed and the workflow moved on
    #[serde(default)]
    pub skipped: bool,
}

impl StepExecutionResult {
    /// Create a successful step result
    pub fn success(
        step_name: impl Into<String>,
        kind: impl Into<String>,
        output: Value,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            kind: kind.into(),
            success: true,
            output: Some(output),
            error: None,
            execution_time_ms,
            skipped: false,
        }
    }

    /// Create a failed step result
    pub fn failure(
        step_name: impl Into<String>,
        kind: impl Into<String>,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            kind: kind.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            execution_time_ms,
            skipped: false,
        }
    }

    /// Mark a failure as absorbed
    pub fn with_skipped(mut self) -> Self {
        self.skipped = true;
        self
    }
}

/// Caller controls for a single run
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Cancelling the token stops the run with a partial answer
    pub cancel: CancellationToken,

    /// Upper bound for any one step
    pub step_timeout: Option<Duration>,

    /// Upper bound for the whole run
    pub deadline: Option<Duration>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Trait for workflow execution
#[async_trait]
pub trait WorkflowExecutor: Send + Sync + std::fmt::Debug {
    /// Run `graph` from its entry step until it reaches the end
    async fn execute(
        &self,
        graph: &WorkflowGraph,
        state: WorkflowState,
        ports: &Ports,
        options: &ExecutionOptions,
    ) -> Result<WorkflowResult, WorkflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_from_state_uses_best_answer() {
        let mut state = WorkflowState::new("q", 1);
        state.draft_answer = Some("draft".to_string());
        state.confidence = Some(0.8);

        let result = WorkflowResult::from_state(
            "standard",
            state,
            vec![StepExecutionResult::success("generate", "generate", json!({}), 10)],
            10,
        );

        assert_eq!(result.answer, "draft");
        assert_eq!(result.confidence, Some(0.8));
        assert_eq!(result.step_names(), vec!["generate"]);
        assert!(!result.cancelled);
    }

    #[test]
    fn test_empty_state_yields_no_information() {
        let result = WorkflowResult::from_state("standard", WorkflowState::new("q", 1), vec![], 0)
            .cancelled();

        assert_eq!(result.answer, NO_RELEVANT_INFORMATION);
        assert_eq!(result.termination, TerminationReason::Cancelled);
        assert!(result.cancelled);
    }

    #[test]
    fn test_step_result_serialization() {
        let result = StepExecutionResult::failure("rerank", "rerank", "timeout", 5).with_skipped();
        let json = serde_json::to_string(&result).unwrap();

        assert!(json.contains("\"skipped\":true"));
        assert!(json.contains("\"error\":\"timeout\""));
        assert!(!json.contains("\"output\""));
    }
}
