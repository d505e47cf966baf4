//! Strategy names

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// The orchestration strategies the registry can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyName {
    #[default]
    Standard,
    Graph,
    Adaptive,
    Iterative,
    Corrective,
    SelfReflective,
    Fusion,
    Raptor,
    Refeed,
    Speculative,
    Agentic,
    Realm,
}

impl StrategyName {
    pub const ALL: [StrategyName; 12] = [
        Self::Standard,
        Self::Graph,
        Self::Adaptive,
        Self::Iterative,
        Self::Corrective,
        Self::SelfReflective,
        Self::Fusion,
        Self::Raptor,
        Self::Refeed,
        Self::Speculative,
        Self::Agentic,
        Self::Realm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Graph => "graph",
            Self::Adaptive => "adaptive",
            Self::Iterative => "iterative",
            Self::Corrective => "corrective",
            Self::SelfReflective => "self-reflective",
            Self::Fusion => "fusion",
            Self::Raptor => "raptor",
            Self::Refeed => "refeed",
            Self::Speculative => "speculative",
            Self::Agentic => "agentic",
            Self::Realm => "realm",
        }
    }

    /// Passages per retrieval call when the config does not override it
    pub fn default_top_k(&self) -> usize {
        match self {
            Self::Standard | Self::Graph | Self::Iterative | Self::Speculative | Self::Agentic => 4,
            Self::Raptor => 10,
            Self::Adaptive
            | Self::Corrective
            | Self::SelfReflective
            | Self::Fusion
            | Self::Refeed
            | Self::Realm => 5,
        }
    }

    /// One-line wiring summary
    pub fn description(&self) -> &'static str {
        match self {
            Self::Standard => "retrieve, then answer from context",
            Self::Graph => "retrieve, link related passages, answer from the best-connected ones",
            Self::Adaptive => "pick a search mode, retrieve, judge relevance, answer or use general knowledge",
            Self::Iterative => "retrieve and answer, asking for follow-up queries until complete",
            Self::Corrective => "answer, verify against sources, correct until confident",
            Self::SelfReflective => "grade retrieved passages, rewrite the query until relevant",
            Self::Fusion => "retrieve for query variants and merge with reciprocal rank fusion",
            Self::Raptor => "retrieve wide, rerank, answer from the top passages",
            Self::Refeed => "rerank, then refeed rewritten queries with random enrichment",
            Self::Speculative => "let the model draft and verify with a retrieval tool",
            Self::Agentic => "let the model drive retrieval with a tool",
            Self::Realm => "classify the domain, retrieve by key terms, refine until complete",
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        match normalized.as_str() {
            "rerank" => return Ok(Self::Raptor),
            "self-rag" | "selfreflective" => return Ok(Self::SelfReflective),
            _ => {}
        }

        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == normalized)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "Unknown strategy '{}'. Valid strategies: {}",
                    s,
                    Self::ALL.map(|n| n.as_str()).join(", ")
                ))
            })
    }
}
