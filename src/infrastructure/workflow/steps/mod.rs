//! Reusable workflow steps
//!
//! Each step reads and writes [`WorkflowState`] and talks to the outside world
//! only through [`Ports`](crate::domain::workflow::Ports). Port failures in
//! enhancement steps are absorbed here with [`absorb`]; only generation steps
//! placed on terminal nodes propagate errors.

mod adaptive;
mod agent;
mod assess;
mod fusion;
mod generate;
mod link;
mod realm;
mod refeed;
mod reformulate;
mod rerank;
mod retrieve;

pub use adaptive::SearchModeStep;
pub use agent::{AgentStep, AgentStyle};
pub use assess::AssessRelevanceStep;
pub use fusion::{fallback_variants, FuseRankingsStep, QueryVariantsStep, RetrieveVariantsStep};
pub use generate::{
    parse_confidence, AnswerSlot, CorrectiveGenerateStep, GenerateStep, GeneralKnowledgeStep,
    NoInformationStep, PromptStyle, DEFAULT_CONFIDENCE, GENERAL_KNOWLEDGE_CONFIDENCE,
};
pub use link::LinkPassagesStep;
pub use realm::{
    classify_domain, extract_key_terms, ClassifyDomainStep, ExtractKeyTermsStep,
    RealmGenerateStep, RealmRefineStep, RealmRetrieveStep,
};
pub use refeed::RefeedStep;
pub use reformulate::{FollowUpStep, ReformulateStep};
pub use rerank::RerankStep;
pub use retrieve::RetrieveStep;

use tracing::warn;

use crate::domain::workflow::WorkflowState;
use crate::infrastructure::observability::record_degradation;

/// Record a failure a step recovered from
pub(crate) fn absorb(state: &mut WorkflowState, kind: &str, note: impl Into<String>) {
    let note = note.into();
    warn!("{} degraded: {}", kind, note);
    record_degradation(kind);
    state.degrade(format!("{}: {}", kind, note));
}

/// Copy the draft into the final answer once a loop is done with it
pub(crate) fn promote_draft(state: &mut WorkflowState) {
    if state.final_answer.is_none() {
        state.final_answer = state.draft_answer.clone();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::domain::generation::mock::MockGenerationPort;
    use crate::domain::retrieval::mock::MockRetrievalPort;
    use crate::domain::retrieval::Passage;
    use crate::domain::workflow::Ports;

    pub fn passages(contents: &[&str]) -> Vec<Passage> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Passage::new(*c, format!("doc-{}", i)).with_score(1.0 - i as f32 * 0.1))
            .collect()
    }

    pub fn ports(
        retrieval: &Arc<MockRetrievalPort>,
        generation: &Arc<MockGenerationPort>,
    ) -> Ports {
        Ports::new(retrieval.clone(), generation.clone())
    }
}
