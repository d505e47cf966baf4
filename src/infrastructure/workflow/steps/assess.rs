use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::iteration::{IterationController, TerminationReason};
use crate::domain::relevance::{AssessmentMode, RelevanceAssessor, RelevanceVerdict};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::relevance::{JudgmentAssessor, TermOverlapAssessor};

/// Judge whether the context answers the original query
///
/// With loop control enabled the step also ends an iteration: a relevant
/// context stops the loop, anything else spends one unit of the budget.
/// Graded passages are kept only when they beat the best seen so far.
#[derive(Debug, Clone)]
pub struct AssessRelevanceStep {
    mode: AssessmentMode,
    threshold: f32,
    loop_control: bool,
}

impl AssessRelevanceStep {
    /// Boolean judgment by the generation port
    pub fn judgment() -> Self {
        Self {
            mode: AssessmentMode::Judgment,
            threshold: 0.5,
            loop_control: false,
        }
    }

    /// Deterministic term-overlap grading
    pub fn term_overlap(threshold: f32) -> Self {
        Self {
            mode: AssessmentMode::TermOverlap,
            threshold,
            loop_control: false,
        }
    }

    pub fn controlling_loop(mut self) -> Self {
        self.loop_control = true;
        self
    }
}

#[async_trait]
impl WorkflowStep for AssessRelevanceStep {
    fn kind(&self) -> &'static str {
        "assess_relevance"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Relevance, StateField::Graded]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let assessor: Box<dyn RelevanceAssessor> = match self.mode {
            AssessmentMode::Judgment => Box::new(JudgmentAssessor::new(ports.generation.clone())),
            AssessmentMode::TermOverlap => Box::new(TermOverlapAssessor::new(self.threshold)),
        };

        let query = state.query().original().to_string();
        let assessment = assessor.assess(&query, &state.context).await;
        let verdict = assessment.verdict.unwrap_or_else(RelevanceVerdict::insufficient);
        let best = assessment.best_score();

        let beats_previous = state.graded.first().is_none_or(|g| best > g.score);
        if verdict.is_relevant || beats_previous {
            state.graded = assessment
                .graded
                .into_iter()
                .filter(|g| g.score > 0.0)
                .collect();
        }
        state.relevance = Some(verdict);

        if self.loop_control {
            if verdict.is_relevant {
                IterationController::stop(&mut state.iteration, TerminationReason::RelevantFound);
            } else {
                IterationController::complete_iteration(&mut state.iteration);
            }
        }

        debug!(
            "{} assessment: relevant={}, score={:.3}, iteration {}/{}",
            assessor.assessor_name(),
            verdict.is_relevant,
            verdict.score,
            state.iteration.iteration(),
            state.iteration.max_iterations()
        );

        Ok(json!({
            "assessor": assessor.assessor_name(),
            "is_relevant": verdict.is_relevant,
            "score": verdict.score,
            "graded": state.graded.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{passages, ports};
    use super::*;
    use crate::domain::generation::mock::MockGenerationPort;
    use crate::domain::retrieval::mock::MockRetrievalPort;
    use crate::domain::retrieval::Context;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_term_overlap_relevant_stops_loop() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new(""));
        let mut state = WorkflowState::new("machine learning methods", 3);
        state.context = Context::from_passages(passages(&[
            "Modern machine learning relies on statistical methods.",
            "Unrelated text about cooking.",
        ]));

        AssessRelevanceStep::term_overlap(0.5)
            .controlling_loop()
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert!(state.relevance.unwrap().is_relevant);
        assert_eq!(state.graded.len(), 1);
        assert_eq!(state.iteration.termination(), TerminationReason::RelevantFound);
        assert_eq!(generation.call_count(), 0);
    }

    #[tokio::test]
    async fn test_irrelevant_spends_budget_and_keeps_best_grades() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new(""));
        let step = AssessRelevanceStep::term_overlap(0.9).controlling_loop();
        let ports = ports(&retrieval, &generation);

        let mut state = WorkflowState::new("rust borrow checker rules", 3);
        state.context = Context::from_passages(passages(&["The borrow checker enforces rules."]));
        step.run(&mut state, &ports).await.unwrap();
        let first_best = state.graded[0].score;

        state.context = Context::from_passages(passages(&["Rust is a language."]));
        step.run(&mut state, &ports).await.unwrap();

        assert!(!state.relevance.unwrap().is_relevant);
        assert_eq!(state.iteration.iteration(), 2);
        assert_eq!(state.graded[0].score, first_best);
        assert_eq!(state.graded[0].passage.content, "The borrow checker enforces rules.");
    }

    #[tokio::test]
    async fn test_judgment_uses_generation_port() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("").with_rule("yes or no", "Yes."));
        let mut state = WorkflowState::new("What is ownership?", 1);
        state.context = Context::from_passages(passages(&[
            "Ownership is a set of rules that govern how a Rust program manages memory.",
        ]));

        AssessRelevanceStep::judgment()
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert!(state.relevance.unwrap().is_relevant);
        assert_eq!(generation.count_matching("yes or no"), 1);
        assert_eq!(state.iteration.termination(), TerminationReason::None);
    }
}
