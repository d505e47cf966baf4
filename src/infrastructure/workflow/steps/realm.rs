use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::debug;

use super::retrieve::retrieve_passages;
use super::{absorb, promote_draft};
use crate::domain::generation::GenerationRequest;
use crate::domain::iteration::{IterationController, TerminationReason};
use crate::domain::reformulation::{check_rewrite_with, Reformulation, COMPLETE};
use crate::domain::retrieval::{Context, SearchMode};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::prompts::{render, REALM_ANSWER, REALM_REFINE};
use crate::infrastructure::reformulation::truncate_chars;

const MAX_KEY_TERMS: usize = 5;
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
const MAX_PROMPT_CONTEXT_CHARS: usize = 3000;

const GENERAL_DOMAIN: &str = "general";

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("legal", &["law", "legal", "court", "rights", "litigation", "attorney"]),
    ("technical", &["code", "software", "hardware", "system", "programming"]),
    ("medical", &["health", "medical", "disease", "treatment", "diagnosis"]),
    ("finance", &["money", "finance", "investment", "market", "stock"]),
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "in", "on", "at", "to", "for", "with", "by", "about",
];

/// First domain, in table order, with a keyword anywhere in the query
pub fn classify_domain(query: &str) -> &'static str {
    let query = query.to_lowercase();

    DOMAIN_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| query.contains(k)))
        .map_or(GENERAL_DOMAIN, |(domain, _)| *domain)
}

/// Distinct words of three or more letters that are not stop words, first five
pub fn extract_key_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in words(query) {
        if word.chars().count() >= 3 && !STOP_WORDS.contains(&word.as_str()) && !terms.contains(&word) {
            terms.push(word);
        }
        if terms.len() == MAX_KEY_TERMS {
            break;
        }
    }
    terms
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Framing put in front of the question; none for general queries
fn domain_prefix(domain: &str) -> &'static str {
    match domain {
        "legal" => "In the context of legal matters, ",
        "technical" => "From a technical perspective, ",
        "medical" => "In medical terminology, ",
        "finance" => "In financial context, ",
        _ => "",
    }
}

/// The question as asked in the generation prompt
pub fn framed_question(domain: &str, query: &str) -> String {
    format!("{}{}", domain_prefix(domain), query)
}

#[derive(Debug, Clone, Default)]
pub struct ClassifyDomainStep;

#[async_trait]
impl WorkflowStep for ClassifyDomainStep {
    fn kind(&self) -> &'static str {
        "classify_domain"
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Domain]
    }

    async fn run(&self, state: &mut WorkflowState, _ports: &Ports) -> Result<Value, DomainError> {
        let domain = classify_domain(state.query().original());
        state.domain = Some(domain.to_string());
        Ok(json!({ "domain": domain }))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractKeyTermsStep;

#[async_trait]
impl WorkflowStep for ExtractKeyTermsStep {
    fn kind(&self) -> &'static str {
        "extract_key_terms"
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::KeyTerms]
    }

    async fn run(&self, state: &mut WorkflowState, _ports: &Ports) -> Result<Value, DomainError> {
        state.key_terms = extract_key_terms(state.query().original());
        Ok(json!({ "key_terms": state.key_terms }))
    }
}

/// Retrieve for the query and each key term, merged and capped
#[derive(Debug, Clone)]
pub struct RealmRetrieveStep {
    top_k: usize,
    max_docs: usize,
}

impl RealmRetrieveStep {
    pub fn new(top_k: usize, max_docs: usize) -> Self {
        Self {
            top_k: top_k.max(1),
            max_docs: max_docs.max(1),
        }
    }
}

#[async_trait]
impl WorkflowStep for RealmRetrieveStep {
    fn kind(&self) -> &'static str {
        "realm_retrieve"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::KeyTerms]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let mut queries = vec![state.query().text().to_string()];
        queries.extend(state.key_terms.iter().cloned());

        let results = join_all(
            queries
                .iter()
                .map(|q| retrieve_passages(ports, q, self.top_k, SearchMode::Semantic)),
        )
        .await;

        let mut context = Context::new();
        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(passages) => {
                    IterationController::record(&mut state.iteration, passages.iter().cloned());
                    context.merge(passages);
                }
                Err(e) => absorb(state, self.kind(), format!("retrieval for {:?} failed: {}", query, e)),
            }
        }
        context.truncate(self.max_docs);

        state.last_retrieved = context.len();
        state.context = context;
        Ok(json!({ "queries": queries, "context_size": state.context.len() }))
    }
}

/// Generate a draft framed for the detected domain
#[derive(Debug, Clone)]
pub struct RealmGenerateStep {
    max_length: u32,
}

impl RealmGenerateStep {
    pub fn new(max_length: u32) -> Self {
        Self { max_length }
    }
}

#[async_trait]
impl WorkflowStep for RealmGenerateStep {
    fn kind(&self) -> &'static str {
        "realm_generate"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::Context, StateField::Domain]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::DraftAnswer]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let joined = state.context.join(CONTEXT_SEPARATOR);
        let domain = state.domain.as_deref().unwrap_or(GENERAL_DOMAIN);
        let question = framed_question(domain, state.query().original());
        let prompt = render(
            REALM_ANSWER,
            &[
                ("question", &question),
                ("context", truncate_chars(&joined, MAX_PROMPT_CONTEXT_CHARS)),
            ],
        );

        let reply = ports
            .generation
            .generate(GenerationRequest::new(prompt).with_max_length(self.max_length))
            .await?;
        state.draft_answer = Some(reply.trim().to_string());

        Ok(json!({ "domain": state.domain, "context_size": state.context.len() }))
    }
}

/// Ask whether the draft is complete; otherwise retrieve for the refinement
///
/// Ends one refinement step per run; the loop also stops when the
/// refinement finds nothing new.
#[derive(Debug, Clone)]
pub struct RealmRefineStep {
    top_k: usize,
    max_length: u32,
}

impl RealmRefineStep {
    pub fn new(top_k: usize, max_length: u32) -> Self {
        Self {
            top_k: top_k.max(1),
            max_length,
        }
    }

    fn finish(state: &mut WorkflowState, action: &str) -> Value {
        IterationController::stop(&mut state.iteration, TerminationReason::ExplicitStop);
        promote_draft(state);
        json!({ "action": action })
    }
}

#[async_trait]
impl WorkflowStep for RealmRefineStep {
    fn kind(&self) -> &'static str {
        "realm_refine"
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

        let original = state.query().original().to_string();
        let prompt = render(
            REALM_REFINE,
            &[
                ("query", &original),
                ("answer", state.draft_answer.as_deref().unwrap_or_default()),
            ],
        );
        let request = GenerationRequest::new(prompt)
            .with_max_length(self.max_length.min(100))
            .with_temperature(0.0);

        let reply = match ports.generation.generate(request).await {
            Ok(reply) => reply,
            Err(e) => {
                absorb(state, self.kind(), format!("refinement check failed, keeping draft: {}", e));
                return Ok(Self::finish(state, "stop"));
            }
        };

        let refinement = match check_rewrite_with(&original, &reply, COMPLETE) {
            Reformulation::Rewritten(refinement) => refinement,
            Reformulation::Stop => return Ok(Self::finish(state, "complete")),
            Reformulation::Rejected { .. } => return Ok(Self::finish(state, "stop")),
        };

        let found = match retrieve_passages(ports, &refinement, self.top_k, SearchMode::Semantic).await {
            Ok(found) => found,
            Err(e) => {
                absorb(state, self.kind(), format!("refinement retrieval failed: {}", e));
                Vec::new()
            }
        };
        IterationController::record(&mut state.iteration, found.iter().cloned());
        let added = state.context.merge(found);
        state.last_retrieved = added;

        if added == 0 {
            debug!("Refinement {:?} found nothing new", refinement);
            return Ok(Self::finish(state, "exhausted"));
        }

        debug!("Refinement {:?} added {} passages", refinement, added);
        Ok(json!({ "action": "refine", "query": refinement, "added": added }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{passages, ports};
    use super::*;
    use crate::domain::generation::mock::MockGenerationPort;
    use crate::domain::retrieval::mock::MockRetrievalPort;
    use std::sync::Arc;

    #[test]
    fn test_classify_domain_takes_first_matching_domain() {
        assert_eq!(classify_domain("Can the court enforce this?"), "legal");
        assert_eq!(classify_domain("Which programming language is fastest?"), "technical");
        assert_eq!(classify_domain("Diagnosis of the flu"), "medical");
        assert_eq!(classify_domain("Stock market trends"), "finance");
        assert_eq!(classify_domain("Tell me a story"), "general");
        // legal is listed before finance
        assert_eq!(classify_domain("Do investment rights pass to heirs?"), "legal");
    }

    #[test]
    fn test_framed_question_per_domain() {
        let cases = [
            ("legal", "In the context of legal matters, what is a tort?"),
            ("technical", "From a technical perspective, what is a tort?"),
            ("medical", "In medical terminology, what is a tort?"),
            ("finance", "In financial context, what is a tort?"),
            ("general", "what is a tort?"),
        ];
        for (domain, expected) in cases {
            assert_eq!(framed_question(domain, "what is a tort?"), expected);
        }
    }

    #[test]
    fn test_extract_key_terms() {
        assert_eq!(
            extract_key_terms("Are the API rules for code reviews strict?"),
            vec!["are", "api", "rules", "code", "reviews"]
        );
        assert_eq!(extract_key_terms("tax on an IRA"), vec!["tax", "ira"]);
        let many = extract_key_terms("alpha bravo charlie delta echo foxtrot golf");
        assert_eq!(many.len(), 5);
    }

    #[tokio::test]
    async fn test_retrieve_query_and_terms_capped() {
        let retrieval = Arc::new(MockRetrievalPort::scripted(vec![
            Ok(passages(&["a", "b"])),
            Ok(passages(&["b", "c"])),
            Ok(passages(&["d", "e", "f"])),
        ]));
        let generation = Arc::new(MockGenerationPort::new(""));
        let mut state = WorkflowState::new("contract liability", 2);
        state.key_terms = vec!["contract".to_string(), "liability".to_string()];

        RealmRetrieveStep::new(5, 4)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(retrieval.queries(), vec!["contract liability", "contract", "liability"]);
        assert_eq!(state.context.join(","), "a,b,c,d");
    }

    #[tokio::test]
    async fn test_generate_uses_domain_framing_and_separator() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("draft"));
        let mut state = WorkflowState::new("Is the contract valid?", 2);
        state.domain = Some("legal".to_string());
        state.context = Context::from_passages(passages(&["one", "two"]));

        RealmGenerateStep::new(128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        let prompt = &generation.prompts()[0];
        assert!(prompt.starts_with("Question: In the context of legal matters, Is the contract valid?"));
        assert!(prompt.contains("one\n\n---\n\ntwo"));
        assert_eq!(state.draft_answer.as_deref(), Some("draft"));
    }

    #[tokio::test]
    async fn test_generate_leaves_general_question_unprefixed() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new("draft"));
        let mut state = WorkflowState::new("Tell me a story", 2);
        state.domain = Some(GENERAL_DOMAIN.to_string());
        state.context = Context::from_passages(passages(&["once upon a time"]));

        RealmGenerateStep::new(128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert!(generation.prompts()[0].starts_with("Question: Tell me a story\n"));
    }

    #[tokio::test]
    async fn test_refine_complete_promotes_draft() {
        let retrieval = Arc::new(MockRetrievalPort::new(passages(&["x"])));
        let generation = Arc::new(MockGenerationPort::new("COMPLETE"));
        let mut state = WorkflowState::new("q about things", 3);
        state.draft_answer = Some("draft".to_string());

        RealmRefineStep::new(5, 128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(state.final_answer.as_deref(), Some("draft"));
        assert_eq!(retrieval.call_count(), 0);
        assert_eq!(state.iteration.termination(), TerminationReason::ExplicitStop);
    }

    #[tokio::test]
    async fn test_refine_prefixed_complete_stops_without_retrieval() {
        let retrieval = Arc::new(MockRetrievalPort::new(passages(&["x"])));
        let generation =
            Arc::new(MockGenerationPort::new("COMPLETE - the answer covers the question"));
        let mut state = WorkflowState::new("q about things", 3);
        state.draft_answer = Some("draft".to_string());

        let output = RealmRefineStep::new(5, 128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(output["action"], "complete");
        assert_eq!(retrieval.call_count(), 0);
        assert_eq!(state.final_answer.as_deref(), Some("draft"));
    }

    #[tokio::test]
    async fn test_refine_retrieves_refinement() {
        let retrieval = Arc::new(MockRetrievalPort::new(passages(&["new evidence"])));
        let generation = Arc::new(MockGenerationPort::new("contract termination clauses"));
        let mut state = WorkflowState::new("q about things", 3);
        state.draft_answer = Some("draft".to_string());
        state.context = Context::from_passages(passages(&["old"]));

        RealmRefineStep::new(5, 128)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(retrieval.queries(), vec!["contract termination clauses"]);
        assert_eq!(state.context.join(","), "old,new evidence");
        assert!(state.iteration.can_continue());
        assert!(state.final_answer.is_none());
    }
}
