//! RAG engine - runs a strategy's workflow for one query

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::iteration::TerminationReason;
use crate::domain::retrieval::Context;
use crate::domain::strategy::{StrategyConfig, StrategyName};
use crate::domain::workflow::{
    ExecutionOptions, Ports, StepExecutionResult, WorkflowExecutor, WorkflowResult, WorkflowState,
};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_workflow_run;
use crate::infrastructure::strategy::StrategyRegistry;
use crate::infrastructure::workflow::GraphExecutor;

/// Answer produced for a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub run_id: Uuid,
    pub strategy: StrategyName,
    pub answer: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    pub termination: TerminationReason,

    /// Passages the answer was generated from
    pub context: Context,

    /// Executed steps, in order
    pub trace: Vec<StepExecutionResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<String>,

    #[serde(default)]
    pub cancelled: bool,

    pub execution_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl AnswerResult {
    fn from_workflow(strategy: StrategyName, result: WorkflowResult) -> Self {
        Self {
            run_id: result.run_id,
            strategy,
            answer: result.answer,
            confidence: result.confidence,
            termination: result.termination,
            context: result.context,
            trace: result.step_results,
            degradations: result.degradations,
            cancelled: result.cancelled,
            execution_time_ms: result.execution_time_ms,
            completed_at: Utc::now(),
        }
    }

    /// Number of times a node ran
    pub fn step_count(&self, step_name: &str) -> usize {
        self.trace.iter().filter(|r| r.step_name == step_name).count()
    }
}

/// Entry point for answering queries with a chosen strategy
pub struct RagEngine {
    ports: Ports,
    registry: StrategyRegistry,
    executor: Arc<dyn WorkflowExecutor>,
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

impl RagEngine {
    pub fn new(ports: Ports) -> Self {
        Self {
            ports,
            registry: StrategyRegistry::new(),
            executor: Arc::new(GraphExecutor::new()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn WorkflowExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Answer `query` with `strategy`, without cancellation or deadlines
    pub async fn generate_answer(
        &self,
        query: &str,
        strategy: StrategyName,
        config: &StrategyConfig,
    ) -> Result<AnswerResult, DomainError> {
        self.generate_answer_with(query, strategy, config, &ExecutionOptions::default())
            .await
    }

    /// Answer `query` with `strategy` under the caller's cancellation and time limits
    pub async fn generate_answer_with(
        &self,
        query: &str,
        strategy: StrategyName,
        config: &StrategyConfig,
        options: &ExecutionOptions,
    ) -> Result<AnswerResult, DomainError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("Query cannot be empty"));
        }
        config.validate()?;

        let graph = self
            .registry
            .build(strategy, config)
            .map_err(|e| DomainError::configuration(e.to_string()))?;
        let state = WorkflowState::new(query, config.loop_budget(strategy));

        let start = Instant::now();
        let result = self
            .executor
            .execute(&graph, state, &self.ports, options)
            .await;
        let elapsed = start.elapsed();

        match result {
            Ok(result) => {
                let outcome = if result.cancelled { "cancelled" } else { "success" };
                record_workflow_run(strategy.as_str(), outcome, elapsed);
                info!(
                    "Strategy '{}' answered in {} steps ({:?}, {} degradations, {}ms)",
                    strategy,
                    result.step_results.len(),
                    result.termination,
                    result.degradations.len(),
                    elapsed.as_millis()
                );
                Ok(AnswerResult::from_workflow(strategy, result))
            }
            Err(e) => {
                record_workflow_run(strategy.as_str(), "error", elapsed);
                error!("Strategy '{}' failed: {}", strategy, e);
                Err(e.into())
            }
        }
    }
}
