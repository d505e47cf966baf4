//! Strategy configuration

use serde::{Deserialize, Serialize};

use super::name::StrategyName;
use crate::domain::error::DomainError;
use crate::domain::generation::DEFAULT_MAX_LENGTH;

/// Per-strategy parameters, fixed for the lifetime of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Verifier confidence needed to accept an answer (0.0 - 1.0)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Budget for reformulation and follow-up loops
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Budget for the corrective loop
    #[serde(default = "default_max_correction_attempts")]
    pub max_correction_attempts: u32,

    /// Best term-overlap score that counts as relevant (0.0 - 1.0)
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Reciprocal rank fusion constant
    #[serde(default = "default_fusion_k")]
    pub fusion_k: u32,

    /// Query variants for fusion, including the original (2 - 4)
    #[serde(default = "default_num_query_variants")]
    pub num_query_variants: usize,

    /// Passages per retrieval; the strategy default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// Answer from general knowledge when documents do not help
    #[serde(default = "default_true")]
    pub use_fallback: bool,

    /// Fail the run on reranker errors instead of keeping the prior order
    #[serde(default)]
    pub strict_enhancements: bool,

    /// Passages kept after fusion
    #[serde(default = "default_fusion_results")]
    pub fusion_results: usize,

    /// Passages kept after reranking
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Budget for the refeed loop
    #[serde(default = "default_refeed_iterations")]
    pub refeed_iterations: u32,

    /// Passages kept per refeed pass before enrichment
    #[serde(default = "default_max_refeed_docs")]
    pub max_refeed_docs: usize,

    /// Share of cut passages sampled back in (0.0 - 1.0)
    #[serde(default = "default_enrichment_factor")]
    pub refeed_enrichment_factor: f32,

    /// Seed for the enrichment sample; random when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment_seed: Option<u64>,

    /// Budget for realm refinement
    #[serde(default = "default_max_refinement_steps")]
    pub max_refinement_steps: u32,

    /// Passages kept by realm retrieval
    #[serde(default = "default_max_context_docs")]
    pub max_context_docs: usize,

    /// Pairwise similarity that links two passages in the graph strategy
    #[serde(default = "default_link_threshold")]
    pub link_threshold: f32,

    /// Length budget for generation calls
    #[serde(default = "default_max_length")]
    pub max_length: u32,
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_max_iterations() -> u32 {
    3
}

fn default_max_correction_attempts() -> u32 {
    2
}

fn default_relevance_threshold() -> f32 {
    0.5
}

fn default_fusion_k() -> u32 {
    60
}

fn default_num_query_variants() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_fusion_results() -> usize {
    3
}

fn default_rerank_top_n() -> usize {
    5
}

fn default_refeed_iterations() -> u32 {
    2
}

fn default_max_refeed_docs() -> usize {
    10
}

fn default_enrichment_factor() -> f32 {
    0.3
}

fn default_max_refinement_steps() -> u32 {
    2
}

fn default_max_context_docs() -> usize {
    5
}

fn default_link_threshold() -> f32 {
    0.7
}

fn default_max_length() -> u32 {
    DEFAULT_MAX_LENGTH
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_iterations: default_max_iterations(),
            max_correction_attempts: default_max_correction_attempts(),
            relevance_threshold: default_relevance_threshold(),
            fusion_k: default_fusion_k(),
            num_query_variants: default_num_query_variants(),
            top_k: None,
            use_fallback: default_true(),
            strict_enhancements: false,
            fusion_results: default_fusion_results(),
            rerank_top_n: default_rerank_top_n(),
            refeed_iterations: default_refeed_iterations(),
            max_refeed_docs: default_max_refeed_docs(),
            refeed_enrichment_factor: default_enrichment_factor(),
            enrichment_seed: None,
            max_refinement_steps: default_max_refinement_steps(),
            max_context_docs: default_max_context_docs(),
            link_threshold: default_link_threshold(),
            max_length: default_max_length(),
        }
    }
}

impl StrategyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold, clamped to 0.0 - 1.0
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the loop budget (at least 1)
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Set the correction budget (at least 1)
    pub fn with_max_correction_attempts(mut self, max: u32) -> Self {
        self.max_correction_attempts = max.max(1);
        self
    }

    /// Set the relevance threshold, clamped to 0.0 - 1.0
    pub fn with_relevance_threshold(mut self, threshold: f32) -> Self {
        self.relevance_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_fusion_k(mut self, k: u32) -> Self {
        self.fusion_k = k.max(1);
        self
    }

    /// Set the variant count, clamped to 2 - 4
    pub fn with_num_query_variants(mut self, n: usize) -> Self {
        self.num_query_variants = n.clamp(2, 4);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k.max(1));
        self
    }

    pub fn with_use_fallback(mut self, use_fallback: bool) -> Self {
        self.use_fallback = use_fallback;
        self
    }

    pub fn with_strict_enhancements(mut self, strict: bool) -> Self {
        self.strict_enhancements = strict;
        self
    }

    pub fn with_refeed_iterations(mut self, n: u32) -> Self {
        self.refeed_iterations = n.max(1);
        self
    }

    pub fn with_enrichment_seed(mut self, seed: u64) -> Self {
        self.enrichment_seed = Some(seed);
        self
    }

    pub fn with_max_refinement_steps(mut self, n: u32) -> Self {
        self.max_refinement_steps = n.max(1);
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    /// Passages per retrieval for a strategy
    pub fn top_k_for(&self, strategy: StrategyName) -> usize {
        self.top_k.unwrap_or_else(|| strategy.default_top_k()).max(1)
    }

    /// Iteration budget for a strategy's loop; 1 for loop-free strategies
    pub fn loop_budget(&self, strategy: StrategyName) -> u32 {
        match strategy {
            StrategyName::Iterative | StrategyName::SelfReflective => self.max_iterations,
            StrategyName::Corrective => self.max_correction_attempts,
            StrategyName::Refeed => self.refeed_iterations,
            StrategyName::Realm => self.max_refinement_steps,
            _ => 1,
        }
    }

    /// Check ranges for values that arrived without the builders
    pub fn validate(&self) -> Result<(), DomainError> {
        let unit = [
            ("confidence_threshold", self.confidence_threshold),
            ("relevance_threshold", self.relevance_threshold),
            ("refeed_enrichment_factor", self.refeed_enrichment_factor),
            ("link_threshold", self.link_threshold),
        ];
        for (field, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(DomainError::validation(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    field, value
                )));
            }
        }

        let budgets = [
            ("max_iterations", self.max_iterations),
            ("max_correction_attempts", self.max_correction_attempts),
            ("refeed_iterations", self.refeed_iterations),
            ("max_refinement_steps", self.max_refinement_steps),
            ("fusion_k", self.fusion_k),
            ("max_length", self.max_length),
        ];
        for (field, value) in budgets {
            if value == 0 {
                return Err(DomainError::validation(format!("{} must be at least 1", field)));
            }
        }

        if !(2..=4).contains(&self.num_query_variants) {
            return Err(DomainError::validation(format!(
                "num_query_variants must be between 2 and 4, got {}",
                self.num_query_variants
            )));
        }

        let sizes = [
            ("top_k", self.top_k.unwrap_or(1)),
            ("fusion_results", self.fusion_results),
            ("rerank_top_n", self.rerank_top_n),
            ("max_refeed_docs", self.max_refeed_docs),
            ("max_context_docs", self.max_context_docs),
        ];
        for (field, value) in sizes {
            if value == 0 {
                return Err(DomainError::validation(format!("{} must be at least 1", field)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StrategyConfig::default();
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_correction_attempts, 2);
        assert_eq!(config.relevance_threshold, 0.5);
        assert_eq!(config.fusion_k, 60);
        assert!(config.use_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders_clamp() {
        let config = StrategyConfig::new()
            .with_confidence_threshold(1.5)
            .with_max_iterations(0)
            .with_num_query_variants(9);

        assert_eq!(config.confidence_threshold, 1.0);
        assert_eq!(config.max_iterations, 1);
        assert_eq!(config.num_query_variants, 4);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = StrategyConfig {
            relevance_threshold: 1.2,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StrategyConfig {
            max_iterations: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_top_k_and_budget_per_strategy() {
        let config = StrategyConfig::default();
        assert_eq!(config.top_k_for(StrategyName::Raptor), 10);
        assert_eq!(config.with_top_k(7).top_k_for(StrategyName::Raptor), 7);

        let config = StrategyConfig::default();
        assert_eq!(config.loop_budget(StrategyName::Corrective), 2);
        assert_eq!(config.loop_budget(StrategyName::Standard), 1);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{"max_iterations": 5, "use_fallback": false}"#).unwrap();
        assert_eq!(config.max_iterations, 5);
        assert!(!config.use_fallback);
        assert_eq!(config.fusion_k, 60);
    }
}
