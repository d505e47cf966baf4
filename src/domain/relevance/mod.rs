//! Relevance assessment domain

mod assessor;
mod verdict;

pub use assessor::{AssessmentMode, RelevanceAssessor};
pub use verdict::{Assessment, GradedPassage, RelevanceVerdict};
