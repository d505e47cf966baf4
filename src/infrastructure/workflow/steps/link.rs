use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::retrieval::Context;
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::relevance::query_terms;

/// Link passages that share most of their terms and put the best-connected
/// passages first.
///
/// Similarity is the overlap coefficient of the two term sets. Passages
/// with equal link counts keep their retrieval order.
#[derive(Debug, Clone)]
pub struct LinkPassagesStep {
    threshold: f32,
}

impl LinkPassagesStep {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl WorkflowStep for LinkPassagesStep {
    fn kind(&self) -> &'static str {
        "link_passages"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    async fn run(&self, state: &mut WorkflowState, _ports: &Ports) -> Result<Value, DomainError> {
        let terms: Vec<HashSet<String>> = state
            .context
            .iter()
            .map(|p| query_terms(&p.content).into_iter().collect())
            .collect();

        let mut degree = vec![0usize; terms.len()];
        let mut links = 0;
        for i in 0..terms.len() {
            for j in (i + 1)..terms.len() {
                if term_similarity(&terms[i], &terms[j]) >= self.threshold {
                    degree[i] += 1;
                    degree[j] += 1;
                    links += 1;
                }
            }
        }

        let mut ranked: Vec<_> = std::mem::take(&mut state.context)
            .into_passages()
            .into_iter()
            .zip(degree)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        state.context = Context::from_passages(ranked.into_iter().map(|(p, _)| p).collect());

        debug!("Linked {} passage pairs", links);
        Ok(json!({ "links": links, "passages": state.context.len() }))
    }
}

fn term_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let smaller = a.len().min(b.len());
    if smaller == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / smaller as f32
}
