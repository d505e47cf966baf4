//! Graph workflow executor

use std::future::pending;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::iteration::{IterationController, TerminationReason};
use crate::domain::workflow::{
    ExecutionOptions, Node, OnErrorAction, Ports, StepExecutionResult, WorkflowError,
    WorkflowExecutor, WorkflowGraph, WorkflowResult, WorkflowState, END,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_degradation, record_step};

/// Configuration for the graph executor
#[derive(Debug, Clone)]
pub struct GraphExecutorConfig {
    /// Maximum number of steps to execute (prevents runaway loops)
    pub max_steps: usize,
}

impl Default for GraphExecutorConfig {
    fn default() -> Self {
        Self { max_steps: 100 }
    }
}

/// Runs a [`WorkflowGraph`] from its entry step to [`END`]
#[derive(Debug, Default)]
pub struct GraphExecutor {
    config: GraphExecutorConfig,
}

enum StepOutcome {
    Finished(Result<Value, DomainError>),
    TimedOut(Duration),
    Interrupted,
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GraphExecutorConfig) -> Self {
        Self { config }
    }

    async fn run_step(
        &self,
        node: &Node,
        state: &mut WorkflowState,
        ports: &Ports,
        options: &ExecutionOptions,
        deadline: Option<Instant>,
    ) -> StepOutcome {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let step_timeout = options.step_timeout;

        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => StepOutcome::Interrupted,
            _ = sleep_for(remaining) => StepOutcome::Interrupted,
            _ = sleep_for(step_timeout) => {
                StepOutcome::TimedOut(step_timeout.unwrap_or_default())
            }
            result = node.step.run(state, ports) => StepOutcome::Finished(result),
        }
    }

    fn interrupted(
        graph: &WorkflowGraph,
        state: WorkflowState,
        step_results: Vec<StepExecutionResult>,
        start: Instant,
    ) -> WorkflowResult {
        warn!(
            "Workflow '{}' interrupted after {} steps, returning partial answer",
            graph.name(),
            step_results.len()
        );
        WorkflowResult::from_state(graph.name(), state, step_results, elapsed_ms(start))
            .cancelled()
    }
}

#[async_trait]
impl WorkflowExecutor for GraphExecutor {
    async fn execute(
        &self,
        graph: &WorkflowGraph,
        mut state: WorkflowState,
        ports: &Ports,
        options: &ExecutionOptions,
    ) -> Result<WorkflowResult, WorkflowError> {
        let start = Instant::now();
        let deadline = options.deadline.map(|d| start + d);
        let mut step_results = Vec::new();
        let mut current = graph.entry().to_string();

        debug!("Executing workflow '{}' for run {}", graph.name(), state.run_id);

        while current != END {
            if step_results.len() >= self.config.max_steps {
                warn!(
                    "Workflow '{}' hit the step limit of {}",
                    graph.name(),
                    self.config.max_steps
                );
                IterationController::stop(&mut state.iteration, TerminationReason::BudgetExhausted);
                state.degrade(WorkflowError::MaxStepsExceeded(self.config.max_steps).to_string());
                break;
            }

            let deadline_passed = deadline.is_some_and(|d| Instant::now() >= d);
            if options.cancel.is_cancelled() || deadline_passed {
                return Ok(Self::interrupted(graph, state, step_results, start));
            }

            let node = graph
                .node(&current)
                .ok_or_else(|| WorkflowError::step_not_found(current.clone()))?;
            let kind = node.step.kind();
            let step_start = Instant::now();

            debug!("Executing step '{}' ({})", node.name, kind);

            let outcome = self
                .run_step(node, &mut state, ports, options, deadline)
                .await;
            let step_elapsed = step_start.elapsed();
            let step_ms = step_elapsed.as_millis() as u64;

            let error = match outcome {
                StepOutcome::Interrupted => {
                    return Ok(Self::interrupted(graph, state, step_results, start));
                }
                StepOutcome::Finished(Ok(output)) => {
                    record_step(kind, true, step_elapsed);
                    step_results.push(StepExecutionResult::success(&node.name, kind, output, step_ms));
                    None
                }
                StepOutcome::Finished(Err(e)) => Some(e),
                StepOutcome::TimedOut(limit) if node.on_error == OnErrorAction::FailWorkflow => {
                    let message = format!("timed out after {}ms", limit.as_millis());
                    record_step(kind, false, step_elapsed);
                    step_results.push(StepExecutionResult::failure(
                        &node.name,
                        kind,
                        message.clone(),
                        step_ms,
                    ));

                    if state.best_answer().is_none() {
                        warn!("Terminal step '{}' {}, ending workflow", node.name, message);
                        return Err(WorkflowError::terminal_step(&node.name, message));
                    }
                    state.degrade(format!("{}: {}", node.name, message));
                    if state.final_answer.is_none() {
                        state.final_answer = state.draft_answer.clone();
                    }
                    return Ok(Self::interrupted(graph, state, step_results, start));
                }
                StepOutcome::TimedOut(limit) => Some(DomainError::internal(
                    WorkflowError::timeout(&node.name, limit.as_millis() as u64).to_string(),
                )),
            };

            if let Some(e) = error {
                record_step(kind, false, step_elapsed);
                let failure = StepExecutionResult::failure(&node.name, kind, e.to_string(), step_ms);

                match node.on_error {
                    OnErrorAction::FailWorkflow => {
                        step_results.push(failure);
                        warn!("Step '{}' failed, ending workflow: {}", node.name, e);
                        return Err(if e.is_generation_failure() {
                            WorkflowError::terminal_step(&node.name, e.to_string())
                        } else {
                            WorkflowError::step_execution(&node.name, e.to_string())
                        });
                    }
                    OnErrorAction::SkipStep => {
                        warn!("Skipping failed step '{}': {}", node.name, e);
                        record_degradation(kind);
                        state.degrade(format!("{}: {}", node.name, e));
                        step_results.push(failure.with_skipped());
                    }
                }
            }

            current = graph.next(&node.name, &state)?;
        }

        let result =
            WorkflowResult::from_state(graph.name(), state, step_results, elapsed_ms(start));
        debug!(
            "Workflow '{}' finished in {}ms ({} steps)",
            result.workflow,
            result.execution_time_ms,
            result.step_results.len()
        );
        Ok(result)
    }
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => pending::<()>().await,
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generation::mock::MockGenerationPort;
    use crate::domain::retrieval::mock::MockRetrievalPort;
    use crate::domain::workflow::test_steps::FieldStep;
    use crate::domain::workflow::{StateField, WorkflowGraphBuilder, WorkflowStep};
    use crate::domain::workflow::NO_RELEVANT_INFORMATION;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    struct SlowStep {
        delay: Duration,
    }

    #[async_trait]
    impl WorkflowStep for SlowStep {
        fn kind(&self) -> &'static str {
            "slow"
        }

        async fn run(&self, state: &mut WorkflowState, _ports: &Ports) -> Result<Value, DomainError> {
            tokio::time::sleep(self.delay).await;
            state.final_answer = Some("late".to_string());
            Ok(json!({}))
        }
    }

    fn ports() -> Ports {
        Ports::new(
            Arc::new(MockRetrievalPort::empty()),
            Arc::new(MockGenerationPort::new("")),
        )
    }

    fn step() -> FieldStep {
        FieldStep::new(vec![], vec![StateField::DraftAnswer])
    }

    #[tokio::test]
    async fn test_execute_linear_graph() {
        let graph = WorkflowGraphBuilder::new("linear")
            .add_node("first", step())
            .add_node("second", step())
            .add_edge("first", "second")
            .add_edge("second", END)
            .set_entry("first")
            .build()
            .unwrap();

        let result = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &ExecutionOptions::new())
            .await
            .unwrap();

        assert_eq!(result.step_names(), vec!["first", "second"]);
        assert_eq!(result.answer, "xx");
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_conditional_loop_follows_router() {
        let graph = WorkflowGraphBuilder::new("loop")
            .add_node("grow", step())
            .add_conditional_edges("grow", &["grow", END], |state| {
                if state.draft_answer.as_deref().map(str::len).unwrap_or(0) < 3 {
                    "grow".to_string()
                } else {
                    END.to_string()
                }
            })
            .set_entry("grow")
            .build()
            .unwrap();

        let result = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &ExecutionOptions::new())
            .await
            .unwrap();

        assert_eq!(result.step_count("grow"), 3);
        assert_eq!(result.answer, "xxx");
    }

    #[tokio::test]
    async fn test_skip_step_records_degradation() {
        let graph = WorkflowGraphBuilder::new("skip")
            .add_node("flaky", FieldStep::failing())
            .add_node("after", step())
            .add_edge("flaky", "after")
            .add_edge("after", END)
            .set_entry("flaky")
            .build()
            .unwrap();

        let result = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &ExecutionOptions::new())
            .await
            .unwrap();

        assert!(result.step_results[0].skipped);
        assert!(!result.step_results[0].success);
        assert_eq!(result.degradations.len(), 1);
        assert_eq!(result.answer, "x");
    }

    #[tokio::test]
    async fn test_terminal_failure_fails_workflow() {
        let graph = WorkflowGraphBuilder::new("terminal")
            .add_terminal_node("generate", FieldStep::failing())
            .add_edge("generate", END)
            .set_entry("generate")
            .build()
            .unwrap();

        let err = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &ExecutionOptions::new())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::TerminalStep { .. }));
    }

    #[tokio::test]
    async fn test_step_limit_stops_runaway_loop() {
        let graph = WorkflowGraphBuilder::new("spin")
            .add_node("spin", step())
            .add_conditional_edges("spin", &["spin", END], |_| "spin".to_string())
            .set_entry("spin")
            .build()
            .unwrap();

        let executor = GraphExecutor::with_config(GraphExecutorConfig { max_steps: 5 });
        let result = executor
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &ExecutionOptions::new())
            .await
            .unwrap();

        assert_eq!(result.step_results.len(), 5);
        assert_eq!(result.termination, TerminationReason::BudgetExhausted);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_returns_partial() {
        let graph = WorkflowGraphBuilder::new("cancel")
            .add_node("first", step())
            .add_edge("first", END)
            .set_entry("first")
            .build()
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = ExecutionOptions::new().with_cancel(cancel);

        let result = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &options)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.termination, TerminationReason::Cancelled);
        assert_eq!(result.answer, NO_RELEVANT_INFORMATION);
        assert!(result.step_results.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_interrupts_slow_step() {
        let graph = WorkflowGraphBuilder::new("deadline")
            .add_node("draft", step())
            .add_node("slow", SlowStep { delay: Duration::from_secs(5) })
            .add_edge("draft", "slow")
            .add_edge("slow", END)
            .set_entry("draft")
            .build()
            .unwrap();

        let options = ExecutionOptions::new().with_deadline(Duration::from_millis(50));
        let result = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &options)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.answer, "x");
    }

    #[tokio::test]
    async fn test_step_timeout_is_a_step_failure() {
        let graph = WorkflowGraphBuilder::new("timeout")
            .add_node("slow", SlowStep { delay: Duration::from_secs(5) })
            .add_edge("slow", END)
            .set_entry("slow")
            .build()
            .unwrap();

        let options = ExecutionOptions::new().with_step_timeout(Duration::from_millis(20));
        let result = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &options)
            .await
            .unwrap();

        assert!(!result.cancelled);
        assert!(result.step_results[0].skipped);
        assert!(result.step_results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Timeout in step 'slow'"));
    }

    #[tokio::test]
    async fn test_terminal_step_timeout_without_draft_is_generation_failure() {
        let graph = WorkflowGraphBuilder::new("terminal_timeout")
            .add_terminal_node("generate", SlowStep { delay: Duration::from_secs(5) })
            .add_edge("generate", END)
            .set_entry("generate")
            .build()
            .unwrap();

        let options = ExecutionOptions::new().with_step_timeout(Duration::from_millis(20));
        let err = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &options)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            WorkflowError::terminal_step("generate", "timed out after 20ms")
        );
        assert!(DomainError::from(err).is_generation_failure());
    }

    #[tokio::test]
    async fn test_terminal_step_timeout_promotes_draft() {
        let graph = WorkflowGraphBuilder::new("terminal_timeout")
            .add_node("draft", step())
            .add_terminal_node("generate", SlowStep { delay: Duration::from_secs(5) })
            .add_edge("draft", "generate")
            .add_edge("generate", END)
            .set_entry("draft")
            .build()
            .unwrap();

        let options = ExecutionOptions::new().with_step_timeout(Duration::from_millis(20));
        let result = GraphExecutor::new()
            .execute(&graph, WorkflowState::new("q", 1), &ports(), &options)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.answer, "x");
        assert_eq!(result.step_names(), vec!["draft", "generate"]);
        assert!(!result.step_results[1].success);
        assert_eq!(result.degradations, vec!["generate: timed out after 20ms"]);
    }
}
