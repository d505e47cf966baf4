//! Relevance assessor trait

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::verdict::Assessment;
use crate::domain::retrieval::Context;

/// Algorithm used to judge context sufficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentMode {
    /// Yes/no question to the generation port
    #[default]
    Judgment,
    /// Deterministic query-term coverage and frequency
    TermOverlap,
}

/// Decides whether a context is sufficient to answer a query
///
/// Assessors never fail: anything that prevents a judgment yields an
/// insufficient verdict. They never mutate the context.
#[async_trait]
pub trait RelevanceAssessor: Send + Sync + Debug {
    /// Assess the context against the query
    async fn assess(&self, query: &str, context: &Context) -> Assessment;

    /// Get the assessor name
    fn assessor_name(&self) -> &'static str;
}
