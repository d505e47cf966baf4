//! Relevance assessor implementations

mod judgment;
mod term_overlap;

pub use judgment::{parse_yes_no, JudgmentAssessor, MIN_CONTEXT_CHARS};
pub use term_overlap::{query_terms, score_passage, TermOverlapAssessor};
