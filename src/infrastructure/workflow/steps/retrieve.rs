use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::absorb;
use crate::domain::iteration::IterationController;
use crate::domain::retrieval::{normalize_ranking, Context, Passage, SearchMode, SearchParams};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;

/// Where the search mode comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeSource {
    Fixed(SearchMode),
    FromState,
}

/// Retrieve passages for the current query
#[derive(Debug, Clone)]
pub struct RetrieveStep {
    top_k: usize,
    mode: ModeSource,
    accumulate: bool,
}

impl RetrieveStep {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k: top_k.max(1),
            mode: ModeSource::Fixed(SearchMode::Semantic),
            accumulate: false,
        }
    }

    /// Use the mode chosen by an earlier step
    pub fn with_mode_from_state(mut self) -> Self {
        self.mode = ModeSource::FromState;
        self
    }

    /// Merge into the existing context instead of replacing it
    pub fn accumulating(mut self) -> Self {
        self.accumulate = true;
        self
    }
}

#[async_trait]
impl WorkflowStep for RetrieveStep {
    fn kind(&self) -> &'static str {
        "retrieve"
    }

    fn requires(&self) -> Vec<StateField> {
        match self.mode {
            ModeSource::FromState => vec![StateField::SearchMode],
            ModeSource::Fixed(_) => Vec::new(),
        }
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let query = state.query().text().to_string();
        let mode = match self.mode {
            ModeSource::Fixed(mode) => mode,
            ModeSource::FromState => state.search_mode.unwrap_or(SearchMode::Hybrid),
        };

        let passages = match retrieve_passages(ports, &query, self.top_k, mode).await {
            Ok(passages) => passages,
            Err(e) => {
                absorb(state, self.kind(), format!("retrieval failed, continuing without context: {}", e));
                Vec::new()
            }
        };
        let found = passages.len();

        IterationController::record(&mut state.iteration, passages.iter().cloned());
        if self.accumulate {
            state.last_retrieved = state.context.merge(passages);
        } else {
            state.context = Context::from_passages(passages);
            state.last_retrieved = state.context.len();
        }

        debug!(
            "Retrieved {} passages ({} mode), context now {}",
            found,
            mode,
            state.context.len()
        );

        Ok(json!({
            "query": query,
            "mode": mode.to_string(),
            "retrieved": found,
            "added": state.last_retrieved,
            "context_size": state.context.len(),
        }))
    }
}

/// Retrieve and normalize; hybrid splits `top_k` between a semantic and a
/// keyword search and merges the two. Hybrid fails only if both halves fail.
pub(crate) async fn retrieve_passages(
    ports: &Ports,
    query: &str,
    top_k: usize,
    mode: SearchMode,
) -> Result<Vec<Passage>, DomainError> {
    match mode {
        SearchMode::Hybrid => {
            let half = top_k.div_ceil(2);
            let (semantic, keyword) = futures::join!(
                fetch(ports, query, half, SearchMode::Semantic),
                fetch(ports, query, half, SearchMode::Keyword)
            );

            match (semantic, keyword) {
                (Err(e), Err(_)) => Err(e),
                (semantic, keyword) => {
                    let mut merged = Context::new();
                    merged.merge(semantic.unwrap_or_default());
                    merged.merge(keyword.unwrap_or_default());
                    Ok(merged.into_passages())
                }
            }
        }
        mode => fetch(ports, query, top_k, mode).await,
    }
}

async fn fetch(
    ports: &Ports,
    query: &str,
    top_k: usize,
    mode: SearchMode,
) -> Result<Vec<Passage>, DomainError> {
    let params = SearchParams::new(query).with_top_k(top_k).with_mode(mode);
    let passages = ports.retrieval.retrieve(params).await?;
    Ok(normalize_ranking(passages, ports.retrieval.score_order()))
}
