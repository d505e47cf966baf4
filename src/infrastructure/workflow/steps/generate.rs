use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use super::absorb;
use crate::domain::generation::GenerationRequest;
use crate::domain::iteration::{IterationController, TerminationReason};
use crate::domain::relevance::GradedPassage;
use crate::domain::retrieval::Context;
use crate::domain::workflow::{
    Ports, StateField, WorkflowState, WorkflowStep, NO_RELEVANT_INFORMATION,
};
use crate::domain::DomainError;
use crate::infrastructure::prompts::{
    render, ADAPTIVE_ANSWER, CORRECTION, DEFAULT_ANSWER, GENERAL_KNOWLEDGE,
    GENERAL_KNOWLEDGE_PREFIX, GRADED_ANSWER, RANKED_ANSWER,
};

/// Confidence assumed when the model omits the marker
pub const DEFAULT_CONFIDENCE: f32 = 0.7;

/// Confidence reported for general-knowledge answers in adaptive mode
pub const GENERAL_KNOWLEDGE_CONFIDENCE: f32 = 0.9;

static CONFIDENCE_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*confidence\s*:\s*([0-9]*\.?[0-9]+)\s*\]").unwrap()
});

/// Which answer field a generation fills
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSlot {
    Draft,
    Final,
}

/// Prompt shape for a generation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Passages joined by newlines
    Default,
    /// Numbered passages, most relevant first
    Ranked,
    /// Best graded passages with their grades
    Graded,
    /// Asks for a trailing confidence marker
    Adaptive,
}

/// Generate an answer from the context
#[derive(Debug, Clone)]
pub struct GenerateStep {
    style: PromptStyle,
    slot: AnswerSlot,
    max_length: u32,
}

impl GenerateStep {
    pub fn new(style: PromptStyle, max_length: u32) -> Self {
        Self {
            style,
            slot: AnswerSlot::Final,
            max_length,
        }
    }

    pub fn into_draft(mut self) -> Self {
        self.slot = AnswerSlot::Draft;
        self
    }

    fn build_prompt(&self, state: &WorkflowState) -> String {
        let query = state.query().original();
        match self.style {
            PromptStyle::Default => render(
                DEFAULT_ANSWER,
                &[("context", &state.context.join("\n")), ("query", query)],
            ),
            PromptStyle::Ranked => render(
                RANKED_ANSWER,
                &[("context", &ranked_context(&state.context)), ("query", query)],
            ),
            PromptStyle::Graded => render(
                GRADED_ANSWER,
                &[("context", &graded_context(&state.graded)), ("query", query)],
            ),
            PromptStyle::Adaptive => render(
                ADAPTIVE_ANSWER,
                &[("context", &state.context.join("\n\n")), ("query", query)],
            ),
        }
    }
}

#[async_trait]
impl WorkflowStep for GenerateStep {
    fn kind(&self) -> &'static str {
        "generate"
    }

    fn requires(&self) -> Vec<StateField> {
        match self.style {
            PromptStyle::Graded => vec![StateField::Graded],
            _ => vec![StateField::Context],
        }
    }

    fn produces(&self) -> Vec<StateField> {
        let mut fields = vec![match self.slot {
            AnswerSlot::Draft => StateField::DraftAnswer,
            AnswerSlot::Final => StateField::FinalAnswer,
        }];
        if self.style == PromptStyle::Adaptive {
            fields.push(StateField::Confidence);
        }
        fields
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let prompt = self.build_prompt(state);
        let reply = ports
            .generation
            .generate(GenerationRequest::new(prompt).with_max_length(self.max_length))
            .await?;

        let answer = if self.style == PromptStyle::Adaptive {
            let (answer, confidence) = parse_confidence(&reply);
            state.confidence = Some(confidence.unwrap_or(DEFAULT_CONFIDENCE));
            answer
        } else {
            reply.trim().to_string()
        };

        debug!("Generated {} chars into {:?}", answer.len(), self.slot);
        let length = answer.len();
        match self.slot {
            AnswerSlot::Draft => state.draft_answer = Some(answer),
            AnswerSlot::Final => state.final_answer = Some(answer),
        }

        Ok(json!({
            "answer_chars": length,
            "context_size": state.context.len(),
            "confidence": state.confidence,
        }))
    }
}

/// Answer from the model's own knowledge when the documents hold nothing
#[derive(Debug, Clone)]
pub struct GeneralKnowledgeStep {
    max_length: u32,
    confidence: Option<f32>,
}

impl GeneralKnowledgeStep {
    pub fn new(max_length: u32) -> Self {
        Self {
            max_length,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }
}

#[async_trait]
impl WorkflowStep for GeneralKnowledgeStep {
    fn kind(&self) -> &'static str {
        "general_knowledge"
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::FinalAnswer]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let prompt = render(GENERAL_KNOWLEDGE, &[("query", state.query().original())]);
        let reply = ports
            .generation
            .generate(GenerationRequest::new(prompt).with_max_length(self.max_length))
            .await?;

        state.final_answer = Some(format!("{}{}", GENERAL_KNOWLEDGE_PREFIX, reply.trim()));
        if self.confidence.is_some() {
            state.confidence = self.confidence;
        }

        Ok(json!({ "fallback": "general_knowledge" }))
    }
}

/// Fixed answer when the documents hold nothing and fallback is off
#[derive(Debug, Clone, Default)]
pub struct NoInformationStep;

#[async_trait]
impl WorkflowStep for NoInformationStep {
    fn kind(&self) -> &'static str {
        "no_information"
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::FinalAnswer]
    }

    async fn run(&self, state: &mut WorkflowState, _ports: &Ports) -> Result<Value, DomainError> {
        state.final_answer = Some(NO_RELEVANT_INFORMATION.to_string());
        Ok(json!({ "fallback": "no_information" }))
    }
}

/// Generate, then verify and regenerate until the verifier is confident
///
/// Generation runs at most `max_attempts` times. Without a verifier the first
/// answer is returned; a failing verifier keeps the current answer.
#[derive(Debug, Clone)]
pub struct CorrectiveGenerateStep {
    threshold: f32,
    max_attempts: u32,
    max_length: u32,
}

impl CorrectiveGenerateStep {
    pub fn new(threshold: f32, max_attempts: u32, max_length: u32) -> Self {
        Self {
            threshold,
            max_attempts: max_attempts.max(1),
            max_length,
        }
    }

    async fn generate(&self, ports: &Ports, prompt: String) -> Result<String, DomainError> {
        ports
            .generation
            .generate(GenerationRequest::new(prompt).with_max_length(self.max_length))
            .await
            .map(|reply| reply.trim().to_string())
    }
}

#[async_trait]
impl WorkflowStep for CorrectiveGenerateStep {
    fn kind(&self) -> &'static str {
        "corrective_generate"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::FinalAnswer, StateField::Confidence]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let query = state.query().original().to_string();
        let sources = state.context.join("\n");

        let mut answer = self
            .generate(ports, render(DEFAULT_ANSWER, &[("context", &sources), ("query", &query)]))
            .await?;
        let mut generations = 1;

        if let Some(verifier) = ports.verifier.clone() {
            for attempt in 1..=self.max_attempts {
                let verdict = verifier.verify(&query, &answer, state.context.passages()).await;
                let confidence = match verdict {
                    Ok(confidence) => confidence,
                    Err(e) => {
                        absorb(state, self.kind(), format!("verification failed, keeping answer: {}", e));
                        break;
                    }
                };
                state.confidence = Some(confidence);
                debug!("Correction attempt {}: confidence {:.2}", attempt, confidence);

                if confidence >= self.threshold {
                    IterationController::stop(&mut state.iteration, TerminationReason::RelevantFound);
                    break;
                }
                if !IterationController::complete_iteration(&mut state.iteration)
                    || attempt == self.max_attempts
                {
                    break;
                }

                let prompt = render(
                    CORRECTION,
                    &[("query", &query), ("answer", &answer), ("context", &sources)],
                );
                match self.generate(ports, prompt).await {
                    Ok(corrected) if !corrected.is_empty() => {
                        answer = corrected;
                        generations += 1;
                    }
                    Ok(_) => {
                        absorb(state, self.kind(), "empty correction, keeping answer");
                        break;
                    }
                    Err(e) => {
                        absorb(state, self.kind(), format!("correction failed, keeping answer: {}", e));
                        break;
                    }
                }
            }
        }

        state.final_answer = Some(answer);
        Ok(json!({
            "generations": generations,
            "confidence": state.confidence,
        }))
    }
}

/// Split a trailing `[Confidence: X.X]` marker from an answer
pub fn parse_confidence(reply: &str) -> (String, Option<f32>) {
    let confidence = CONFIDENCE_MARKER
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0));
    let answer = CONFIDENCE_MARKER.replace_all(reply, "").trim().to_string();
    (answer, confidence)
}

fn ranked_context(context: &Context) -> String {
    context
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i + 1, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn graded_context(graded: &[GradedPassage]) -> String {
    graded
        .iter()
        .map(|g| format!("[Relevance {:.2}] {}", g.score, g.passage.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{passages, ports};
    use super::*;
    use crate::domain::generation::mock::MockGenerationPort;
    use crate::domain::retrieval::mock::MockRetrievalPort;
    use crate::domain::verification::MockFactVerifier;
    use std::sync::Arc;

    fn state_with_context() -> WorkflowState {
        let mut state = WorkflowState::new("What is a lifetime?", 2);
        state.context = Context::from_passages(passages(&["Lifetimes name scopes.", "They prevent dangling references."]));
        state
    }

    #[test]
    fn test_parse_confidence() {
        let (answer, confidence) = parse_confidence("Lifetimes are scopes. [Confidence: 0.85]");
        assert_eq!(answer, "Lifetimes are scopes.");
        assert_eq!(confidence, Some(0.85));

        let (answer, confidence) = parse_confidence("No marker here");
        assert_eq!(answer, "No marker here");
        assert_eq!(confidence, None);
    }

    #[tokio::test]
    async fn test_default_prompt_and_final_slot() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("  A lifetime is a scope.  "));
        let mut state = state_with_context();

        GenerateStep::new(PromptStyle::Default, 128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(state.final_answer.as_deref(), Some("A lifetime is a scope."));
        assert_eq!(
            generation.prompts()[0],
            "Context: Lifetimes name scopes.\nThey prevent dangling references.\n\nQuestion: What is a lifetime?\n\nAnswer:"
        );
    }

    #[tokio::test]
    async fn test_adaptive_defaults_confidence() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("Scopes."));
        let mut state = state_with_context();

        GenerateStep::new(PromptStyle::Adaptive, 128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(state.confidence, Some(DEFAULT_CONFIDENCE));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::failing("HTTP 500"));
        let mut state = state_with_context();

        let err = GenerateStep::new(PromptStyle::Default, 128)
            .into_draft()
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap_err();

        assert!(err.is_generation_failure());
        assert!(state.draft_answer.is_none());
    }

    #[tokio::test]
    async fn test_general_knowledge_prefix() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("Paris."));
        let mut state = WorkflowState::new("Capital of France?", 1);

        GeneralKnowledgeStep::new(64)
            .with_confidence(GENERAL_KNOWLEDGE_CONFIDENCE)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(state.final_answer.as_deref(), Some("Based on general knowledge: Paris."));
        assert_eq!(state.confidence, Some(0.9));
    }

    #[tokio::test]
    async fn test_corrective_regenerates_until_confident() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(
            MockGenerationPort::new("first answer").with_rule("Corrected answer:", "second answer"),
        );
        let mut verifier = MockFactVerifier::new();
        let mut scores = vec![0.3_f32, 0.9].into_iter();
        verifier
            .expect_verify()
            .times(2)
            .returning(move |_, _, _| Ok(scores.next().unwrap_or(1.0)));
        let ports = ports(&retrieval, &generation).with_verifier(Arc::new(verifier));
        let mut state = state_with_context();

        CorrectiveGenerateStep::new(0.7, 2, 128)
            .run(&mut state, &ports)
            .await
            .unwrap();

        assert_eq!(state.final_answer.as_deref(), Some("second answer"));
        assert_eq!(generation.call_count(), 2);
        assert_eq!(state.confidence, Some(0.9));
    }

    #[tokio::test]
    async fn test_corrective_without_verifier_generates_once() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("only answer"));
        let mut state = state_with_context();

        CorrectiveGenerateStep::new(0.7, 3, 128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(state.final_answer.as_deref(), Some("only answer"));
        assert_eq!(generation.call_count(), 1);
    }

    #[tokio::test]
    async fn test_corrective_keeps_answer_when_verifier_fails() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("kept"));
        let mut verifier = MockFactVerifier::new();
        verifier
            .expect_verify()
            .returning(|_, _, _| Err(DomainError::verification_failed("judge offline")));
        let ports = ports(&retrieval, &generation).with_verifier(Arc::new(verifier));
        let mut state = state_with_context();

        CorrectiveGenerateStep::new(0.7, 2, 128)
            .run(&mut state, &ports)
            .await
            .unwrap();

        assert_eq!(state.final_answer.as_deref(), Some("kept"));
        assert_eq!(generation.call_count(), 1);
        assert_eq!(state.degradations.len(), 1);
    }
}
