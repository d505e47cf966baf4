use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{absorb, promote_draft};
use crate::domain::generation::GenerationRequest;
use crate::domain::iteration::{IterationController, TerminationReason};
use crate::domain::reformulation::{
    check_rewrite_with, QueryReformulator, RejectReason, Reformulation, ReformulationRequest,
    COMPLETE,
};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::prompts::{render, FOLLOW_UP};
use crate::infrastructure::reformulation::{truncate_chars, LlmQueryReformulator, ReformulationStyle};

const FOLLOW_UP_CONTEXT_CHARS: usize = 1500;

/// Rewrite the query after an irrelevant retrieval
///
/// A rejected rewrite or the stop sentinel ends the loop: retrying the same
/// query cannot find anything new.
#[derive(Debug, Clone, Default)]
pub struct ReformulateStep;

#[async_trait]
impl WorkflowStep for ReformulateStep {
    fn kind(&self) -> &'static str {
        "reformulate_query"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let reformulator =
            LlmQueryReformulator::new(ports.generation.clone(), ReformulationStyle::Reflective);
        let original = state.query().original().to_string();
        let current = state.query().text().to_string();

        let outcome = reformulator
            .reformulate(
                ReformulationRequest::new(&original, &current, &state.context)
                    .with_draft(state.draft_answer.as_deref()),
            )
            .await;

        let label = match &outcome {
            Reformulation::Rewritten(query) => {
                state.reformulate(query.clone());
                "rewritten"
            }
            Reformulation::Rejected { reason, .. } => {
                if *reason == RejectReason::Malformed {
                    absorb(state, self.kind(), "no usable rewrite, keeping current query");
                }
                IterationController::stop(&mut state.iteration, TerminationReason::ExplicitStop);
                "rejected"
            }
            Reformulation::Stop => {
                IterationController::stop(&mut state.iteration, TerminationReason::ExplicitStop);
                "stop"
            }
        };

        debug!("Reformulation {}: now searching {:?}", label, state.query().text());
        Ok(json!({ "outcome": label, "query": state.query().text() }))
    }
}

/// Ask whether the draft is complete; otherwise set the follow-up query
///
/// Ends one iteration per run. The draft becomes the final answer once the
/// loop stops for any reason.
#[derive(Debug, Clone)]
pub struct FollowUpStep {
    max_length: u32,
}

impl FollowUpStep {
    pub fn new(max_length: u32) -> Self {
        Self { max_length }
    }

    fn finish(state: &mut WorkflowState, reason: TerminationReason) {
        IterationController::stop(&mut state.iteration, reason);
        promote_draft(state);
    }
}

#[async_trait]
impl WorkflowStep for FollowUpStep {
    fn kind(&self) -> &'static str {
        "follow_up"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::DraftAnswer]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::FinalAnswer]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        if !IterationController::complete_iteration(&mut state.iteration) {
            promote_draft(state);
            return Ok(json!({ "action": "budget_exhausted" }));
        }

        let context = state.context.join("\n\n");
        let prompt = render(
            FOLLOW_UP,
            &[
                ("query", state.query().original()),
                ("answer", state.draft_answer.as_deref().unwrap_or_default()),
                ("context", truncate_chars(&context, FOLLOW_UP_CONTEXT_CHARS)),
            ],
        );
        let request = GenerationRequest::new(prompt)
            .with_max_length(self.max_length.min(100))
            .with_temperature(0.0);

        let reply = match ports.generation.generate(request).await {
            Ok(reply) => reply,
            Err(e) => {
                absorb(state, self.kind(), format!("follow-up failed, keeping draft: {}", e));
                Self::finish(state, TerminationReason::ExplicitStop);
                return Ok(json!({ "action": "stop" }));
            }
        };

        let current = state.query().text().to_string();
        match check_rewrite_with(&current, &reply, COMPLETE) {
            Reformulation::Rewritten(query) => {
                debug!("Follow-up query: {:?}", query);
                state.reformulate(query);
                Ok(json!({ "action": "continue", "query": state.query().text() }))
            }
            Reformulation::Stop => {
                Self::finish(state, TerminationReason::ExplicitStop);
                Ok(json!({ "action": "complete" }))
            }
            Reformulation::Rejected { reason, .. } => {
                debug!("Follow-up query rejected ({:?}), stopping", reason);
                Self::finish(state, TerminationReason::ExplicitStop);
                Ok(json!({ "action": "stop" }))
            }
        }
    }
}
