//! Query reformulation and its guardrails

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::retrieval::Context;

/// Reply meaning the answer is not retrievable from the corpus
pub const NO_REWRITE: &str = "NO_REWRITE";

/// Reply meaning an answer needs no further refinement
pub const COMPLETE: &str = "COMPLETE";

/// Shortest acceptable rewrite, in characters
pub const MIN_REWRITE_CHARS: usize = 10;

/// Longest acceptable rewrite, in characters
pub const MAX_REWRITE_CHARS: usize = 300;

/// Why a candidate rewrite was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Identical,
    TooShort,
    TooLong,
    /// The generation call failed or returned nothing usable
    Malformed,
}

/// Result of a reformulation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reformulation {
    /// A usable new query
    Rewritten(String),
    /// Candidate discarded; keep using `fallback`
    Rejected { reason: RejectReason, fallback: String },
    /// The model signalled that further rewrites are pointless
    Stop,
}

impl Reformulation {
    /// The query to use next
    pub fn query<'a>(&'a self, current: &'a str) -> &'a str {
        match self {
            Self::Rewritten(query) => query,
            Self::Rejected { fallback, .. } => fallback,
            Self::Stop => current,
        }
    }

    pub fn is_rewritten(&self) -> bool {
        matches!(self, Self::Rewritten(_))
    }
}

/// What the reformulator is asked to improve
#[derive(Debug, Clone)]
pub struct ReformulationRequest<'a> {
    /// Query as first asked
    pub original: &'a str,
    /// Query used for the last retrieval
    pub current: &'a str,
    /// What has been found so far
    pub context: &'a Context,
    /// Draft answer, when one exists
    pub draft: Option<&'a str>,
}

impl<'a> ReformulationRequest<'a> {
    pub fn new(original: &'a str, current: &'a str, context: &'a Context) -> Self {
        Self {
            original,
            current,
            context,
            draft: None,
        }
    }

    pub fn with_draft(mut self, draft: Option<&'a str>) -> Self {
        self.draft = draft;
        self
    }
}

/// Produces a new query from the original and the known context
#[async_trait]
pub trait QueryReformulator: Send + Sync + Debug {
    async fn reformulate(&self, request: ReformulationRequest<'_>) -> Reformulation;

    fn reformulator_name(&self) -> &'static str;
}

/// Apply the rewrite guardrails to a raw model reply, with `NO_REWRITE` as
/// the stop sentinel.
pub fn check_rewrite(current: &str, candidate: &str) -> Reformulation {
    check_rewrite_with(current, candidate, NO_REWRITE)
}

/// Apply the rewrite guardrails with a custom stop sentinel.
///
/// The reply is trimmed and stripped of surrounding quotes before the
/// sentinel check and the length guards.
pub fn check_rewrite_with(current: &str, candidate: &str, sentinel: &str) -> Reformulation {
    let cleaned = clean_reply(candidate);

    if mentions_sentinel(&cleaned, sentinel) {
        return Reformulation::Stop;
    }

    let reject = |reason| Reformulation::Rejected {
        reason,
        fallback: current.to_string(),
    };

    if cleaned.is_empty() {
        return reject(RejectReason::Malformed);
    }
    if cleaned.to_lowercase() == current.trim().to_lowercase() {
        return reject(RejectReason::Identical);
    }

    let chars = cleaned.chars().count();
    if chars < MIN_REWRITE_CHARS {
        return reject(RejectReason::TooShort);
    }
    if chars > MAX_REWRITE_CHARS {
        return reject(RejectReason::TooLong);
    }

    Reformulation::Rewritten(cleaned)
}

/// Whether a reply carries the stop sentinel.
///
/// Matches a first line that is the sentinel or starts with `SENTINEL:`, in
/// any case, and the upper-case sentinel as a whole word anywhere else
/// (`"The answer is COMPLETE."`). A lower-case word such as "complete" inside
/// a query does not count.
fn mentions_sentinel(reply: &str, sentinel: &str) -> bool {
    let first_line = reply
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '_');
    if first_line.eq_ignore_ascii_case(sentinel) {
        return true;
    }
    if first_line
        .split_once(':')
        .is_some_and(|(head, _)| head.trim().eq_ignore_ascii_case(sentinel))
    {
        return true;
    }

    reply
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| word == sentinel)
}

fn clean_reply(reply: &str) -> String {
    let trimmed = reply.trim();
    let trimmed = trimmed
        .strip_prefix("Rewritten query:")
        .or_else(|| trimmed.strip_prefix("Query:"))
        .unwrap_or(trimmed)
        .trim();
    trimmed
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}
