use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::debug;

use super::absorb;
use super::rerank::rerank_passages;
use super::retrieve::retrieve_passages;
use crate::domain::iteration::{IterationController, TerminationReason};
use crate::domain::reformulation::{
    QueryReformulator, RejectReason, Reformulation, ReformulationRequest,
};
use crate::domain::retrieval::{Context, Passage, SearchMode};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::reformulation::{LlmQueryReformulator, ReformulationStyle};

/// One feedback round: reformulate from what was found, retrieve again,
/// merge, rerank against the original query and cut back to `max_docs`.
///
/// Then `floor(kept * enrichment_factor)` of the cut passages, at most all
/// of them, are picked at random and appended back.
#[derive(Debug, Clone)]
pub struct RefeedStep {
    top_k: usize,
    max_docs: usize,
    enrichment_factor: f32,
    seed: Option<u64>,
    strict: bool,
}

impl RefeedStep {
    pub fn new(top_k: usize, max_docs: usize, enrichment_factor: f32) -> Self {
        Self {
            top_k: top_k.max(1),
            max_docs: max_docs.max(1),
            enrichment_factor: enrichment_factor.clamp(0.0, 1.0),
            seed: None,
            strict: false,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn rng(&self, iteration: u32) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(iteration))),
            None => StdRng::from_entropy(),
        }
    }

    fn enrich(&self, kept: usize, dropped: Vec<Passage>, iteration: u32) -> Vec<Passage> {
        let amount =
            ((kept as f32 * self.enrichment_factor).floor() as usize).min(dropped.len());
        if amount == 0 {
            return Vec::new();
        }

        let mut picked = sample(&mut self.rng(iteration), dropped.len(), amount).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| dropped[i].clone()).collect()
    }

    fn stop(state: &mut WorkflowState, action: &str) -> Value {
        IterationController::stop(&mut state.iteration, TerminationReason::ExplicitStop);
        json!({ "action": action })
    }
}

#[async_trait]
impl WorkflowStep for RefeedStep {
    fn kind(&self) -> &'static str {
        "refeed"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let original = state.query().original().to_string();
        let current = state.query().text().to_string();

        let reformulator =
            LlmQueryReformulator::new(ports.generation.clone(), ReformulationStyle::Refeed);
        let outcome = reformulator
            .reformulate(ReformulationRequest::new(&original, &current, &state.context))
            .await;

        let next_query = match outcome {
            Reformulation::Rewritten(query) => query,
            Reformulation::Rejected { reason, .. } => {
                absorb(state, self.kind(), rejection_note(reason));
                return Ok(Self::stop(state, "stop"));
            }
            Reformulation::Stop => return Ok(Self::stop(state, "stop")),
        };

        let found = match retrieve_passages(ports, &next_query, self.top_k, SearchMode::Semantic).await {
            Ok(found) => found,
            Err(e) => {
                absorb(state, self.kind(), format!("refeed retrieval failed: {}", e));
                Vec::new()
            }
        };
        if found.is_empty() {
            debug!("Refeed query {:?} found nothing, stopping", next_query);
            return Ok(Self::stop(state, "exhausted"));
        }

        state.reformulate(next_query);
        IterationController::record(&mut state.iteration, found.iter().cloned());

        let mut merged = state.context.clone();
        let added = merged.merge(found);
        let ranked =
            rerank_passages(state, ports, &original, merged.into_passages(), self.strict).await?;

        let mut kept = ranked;
        let dropped = if kept.len() > self.max_docs {
            kept.split_off(self.max_docs)
        } else {
            Vec::new()
        };
        let enrichment = self.enrich(kept.len(), dropped, state.iteration.iteration());

        let mut context = Context::from_passages(kept);
        let enriched = context.merge(enrichment);
        state.context = context;
        state.last_retrieved = added;
        IterationController::complete_iteration(&mut state.iteration);

        debug!(
            "Refeed round {}: {} new, {} enrichment, context {}",
            state.iteration.iteration(),
            added,
            enriched,
            state.context.len()
        );

        Ok(json!({
            "action": "refeed",
            "query": state.query().text(),
            "added": added,
            "enriched": enriched,
            "context_size": state.context.len(),
        }))
    }
}

fn rejection_note(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::Malformed => "no usable refeed query",
        RejectReason::Identical => "refeed query repeats the current one",
        RejectReason::TooShort => "refeed query too short",
        RejectReason::TooLong => "refeed query too long",
    }
}
