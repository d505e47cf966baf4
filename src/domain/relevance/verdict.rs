//! Relevance verdicts and graded passages

use serde::{Deserialize, Serialize};

use crate::domain::retrieval::Passage;

/// Outcome of a sufficiency check
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    /// Drives branching
    pub is_relevant: bool,

    /// Advisory score (0.0 - 1.0)
    pub score: f32,
}

impl RelevanceVerdict {
    pub fn new(is_relevant: bool, score: f32) -> Self {
        Self {
            is_relevant,
            score: score.clamp(0.0, 1.0),
        }
    }

    /// Verdict used whenever an assessment cannot be made
    pub fn insufficient() -> Self {
        Self::new(false, 0.0)
    }
}

/// A passage annotated with its relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedPassage {
    pub passage: Passage,
    pub score: f32,
}

impl GradedPassage {
    pub fn new(passage: Passage, score: f32) -> Self {
        Self { passage, score }
    }
}

/// Verdict plus per-passage grades, best first
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assessment {
    pub verdict: Option<RelevanceVerdict>,
    pub graded: Vec<GradedPassage>,
}

impl Assessment {
    pub fn new(verdict: RelevanceVerdict, graded: Vec<GradedPassage>) -> Self {
        Self {
            verdict: Some(verdict),
            graded,
        }
    }

    /// Assessment without per-passage grades
    pub fn verdict_only(verdict: RelevanceVerdict) -> Self {
        Self::new(verdict, Vec::new())
    }

    pub fn is_relevant(&self) -> bool {
        self.verdict.map(|v| v.is_relevant).unwrap_or(false)
    }

    /// Highest passage score, zero when nothing was graded
    pub fn best_score(&self) -> f32 {
        self.graded.first().map(|g| g.score).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_clamps_score() {
        assert_eq!(RelevanceVerdict::new(true, 1.7).score, 1.0);
        assert_eq!(RelevanceVerdict::new(false, -0.2).score, 0.0);
    }

    #[test]
    fn test_empty_assessment_is_not_relevant() {
        let assessment = Assessment::default();
        assert!(!assessment.is_relevant());
        assert_eq!(assessment.best_score(), 0.0);
    }
}
