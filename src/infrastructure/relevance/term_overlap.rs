//! Deterministic term-overlap relevance
//!
//! No generation calls: passages are graded by how many query terms they
//! contain and how often.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::relevance::{Assessment, GradedPassage, RelevanceAssessor, RelevanceVerdict};
use crate::domain::retrieval::{Context, Passage};

const COVERAGE_WEIGHT: f32 = 0.7;
const FREQUENCY_WEIGHT: f32 = 0.3;

/// Score at which a passage counts towards the "several decent passages" rule
pub const SUPPORTING_SCORE: f32 = 0.3;

/// Passages at `SUPPORTING_SCORE` or better that make a context relevant
pub const SUPPORTING_PASSAGES: usize = 3;

/// Grades passages by query-term coverage and frequency
#[derive(Debug, Clone)]
pub struct TermOverlapAssessor {
    threshold: f32,
}

impl TermOverlapAssessor {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Grade every passage, best first. Equal scores keep context order.
    pub fn grade(&self, query: &str, passages: &[Passage]) -> Vec<GradedPassage> {
        let terms = query_terms(query);
        let mut graded: Vec<GradedPassage> = passages
            .iter()
            .map(|p| GradedPassage::new(p.clone(), score_passage(&terms, &p.content)))
            .collect();

        graded.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        graded
    }

    /// Apply the relevance rule to graded passages
    pub fn verdict(&self, graded: &[GradedPassage]) -> RelevanceVerdict {
        let best = graded.first().map(|g| g.score).unwrap_or(0.0);
        let supporting = graded
            .iter()
            .filter(|g| g.score >= SUPPORTING_SCORE)
            .count();

        RelevanceVerdict::new(
            best >= self.threshold || supporting >= SUPPORTING_PASSAGES,
            best,
        )
    }
}

#[async_trait]
impl RelevanceAssessor for TermOverlapAssessor {
    async fn assess(&self, query: &str, context: &Context) -> Assessment {
        let graded = self.grade(query, context.passages());
        let verdict = self.verdict(&graded);

        debug!(
            "Term overlap graded {} passages: best={:.3}, relevant={}",
            graded.len(),
            verdict.score,
            verdict.is_relevant
        );

        Assessment::new(verdict, graded)
    }

    fn assessor_name(&self) -> &'static str {
        "term_overlap"
    }
}

/// Lowercased whitespace tokens of three or more characters, with
/// surrounding punctuation removed. Duplicates are kept once.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query.split_whitespace() {
        let term = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if term.chars().count() >= 3 && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// `0.7 * coverage + 0.3 * min(1, matches / (terms * 2))`
pub fn score_passage(terms: &[String], content: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }

    let lowered = content.to_lowercase();
    let mut present = 0usize;
    let mut matches = 0usize;

    for term in terms {
        let count = lowered.matches(term.as_str()).count();
        if count > 0 {
            present += 1;
            matches += count;
        }
    }

    let total = terms.len() as f32;
    let coverage = present as f32 / total;
    let frequency = (matches as f32 / (total * 2.0)).min(1.0);

    COVERAGE_WEIGHT * coverage + FREQUENCY_WEIGHT * frequency
}
