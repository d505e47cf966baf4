//! Shared workflow state

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::iteration::{IterationController, IterationState};
use crate::domain::relevance::{GradedPassage, RelevanceVerdict};
use crate::domain::retrieval::{Context, Passage, SearchMode};

/// Answer returned when the documents hold nothing usable and fallback is off
pub const NO_RELEVANT_INFORMATION: &str =
    "No relevant information found in the documents to answer your query.";

/// The user's query, possibly reformulated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    original: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            original: None,
        }
    }

    /// Current query text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Query as first asked
    pub fn original(&self) -> &str {
        self.original.as_deref().unwrap_or(&self.text)
    }

    pub fn is_reformulated(&self) -> bool {
        self.original.is_some()
    }

    /// A new query that keeps this one's original
    pub fn reformulated(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            original: Some(self.original().to_string()),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Fields a step may read or write, used for build-time validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateField {
    Context,
    Relevance,
    Graded,
    DraftAnswer,
    FinalAnswer,
    Confidence,
    SearchMode,
    QueryVariants,
    VariantResults,
    Domain,
    KeyTerms,
    AgentOutcome,
}

impl StateField {
    pub const ALL: [StateField; 12] = [
        Self::Context,
        Self::Relevance,
        Self::Graded,
        Self::DraftAnswer,
        Self::FinalAnswer,
        Self::Confidence,
        Self::SearchMode,
        Self::QueryVariants,
        Self::VariantResults,
        Self::Domain,
        Self::KeyTerms,
        Self::AgentOutcome,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Relevance => "relevance",
            Self::Graded => "graded",
            Self::DraftAnswer => "draft_answer",
            Self::FinalAnswer => "final_answer",
            Self::Confidence => "confidence",
            Self::SearchMode => "search_mode",
            Self::QueryVariants => "query_variants",
            Self::VariantResults => "variant_results",
            Self::Domain => "domain",
            Self::KeyTerms => "key_terms",
            Self::AgentOutcome => "agent_outcome",
        }
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The single mutable object threaded through a workflow run
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub run_id: Uuid,
    query: Query,
    pub context: Context,
    pub relevance: Option<RelevanceVerdict>,
    /// Best graded passages seen so far
    pub graded: Vec<GradedPassage>,
    pub iteration: IterationState,
    pub draft_answer: Option<String>,
    pub final_answer: Option<String>,
    pub confidence: Option<f32>,
    pub search_mode: Option<SearchMode>,
    pub query_variants: Vec<String>,
    /// One ranked list per query variant, in variant order
    pub variant_results: Vec<Vec<Passage>>,
    pub domain: Option<String>,
    pub key_terms: Vec<String>,
    pub agent_succeeded: Option<bool>,
    /// Passages added by the most recent retrieval
    pub last_retrieved: usize,
    /// Absorbed failures, in order
    pub degradations: Vec<String>,
}

impl WorkflowState {
    /// Fresh state for a query with the given loop budget
    pub fn new(query: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: Query::new(query),
            context: Context::new(),
            relevance: None,
            graded: Vec::new(),
            iteration: IterationController::start(max_iterations),
            draft_answer: None,
            final_answer: None,
            confidence: None,
            search_mode: None,
            query_variants: Vec::new(),
            variant_results: Vec::new(),
            domain: None,
            key_terms: Vec::new(),
            agent_succeeded: None,
            last_retrieved: 0,
            degradations: Vec::new(),
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Replace the current query, keeping the original
    pub fn reformulate(&mut self, text: impl Into<String>) {
        self.query = self.query.reformulated(text);
    }

    /// Go back to the original query
    pub fn restore_original_query(&mut self) {
        if self.query.is_reformulated() {
            self.query = Query::new(self.query.original().to_string());
        }
    }

    /// Record an absorbed failure
    pub fn degrade(&mut self, note: impl Into<String>) {
        self.degradations.push(note.into());
    }

    /// Best answer available right now
    pub fn best_answer(&self) -> Option<&str> {
        [self.final_answer.as_deref(), self.draft_answer.as_deref()]
            .into_iter()
            .flatten()
            .find(|a| !a.trim().is_empty())
    }
}
