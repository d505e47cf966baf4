use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::absorb;
use crate::domain::retrieval::{Context, Passage};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;

/// Reorder the context with the configured reranker, then optionally cut it
///
/// Without a reranker the step only truncates. Reranker failures keep the
/// current order unless `strict` is set.
#[derive(Debug, Clone)]
pub struct RerankStep {
    limit: Option<usize>,
    strict: bool,
}

impl RerankStep {
    pub fn new() -> Self {
        Self {
            limit: None,
            strict: false,
        }
    }

    /// Keep at most `limit` passages after reranking
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit.max(1));
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Default for RerankStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStep for RerankStep {
    fn kind(&self) -> &'static str {
        "rerank"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let query = state.query().original().to_string();
        let before = state.context.len();
        let passages = state.context.passages().to_vec();

        let reranked = rerank_passages(state, ports, &query, passages, self.strict).await?;
        let mut context = Context::from_passages(reranked);
        if let Some(limit) = self.limit {
            context.truncate(limit);
        }
        state.context = context;

        debug!("Rerank kept {} of {} passages", state.context.len(), before);
        Ok(json!({
            "reranker": ports.reranker.is_some(),
            "before": before,
            "after": state.context.len(),
        }))
    }
}

/// Rerank against `query`, falling back to the given order on failure
pub(crate) async fn rerank_passages(
    state: &mut WorkflowState,
    ports: &Ports,
    query: &str,
    passages: Vec<Passage>,
    strict: bool,
) -> Result<Vec<Passage>, DomainError> {
    let Some(reranker) = ports.reranker.as_ref() else {
        return Ok(passages);
    };
    if passages.is_empty() {
        return Ok(passages);
    }

    match reranker.rerank(query, &passages).await {
        Ok(reranked) if !reranked.is_empty() => Ok(reranked),
        Ok(_) => {
            absorb(state, "rerank", "reranker returned nothing, keeping order");
            Ok(passages)
        }
        Err(e) if strict => Err(e),
        Err(e) => {
            absorb(state, "rerank", format!("reranker failed, keeping order: {}", e));
            Ok(passages)
        }
    }
}
