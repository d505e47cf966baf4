//! Retrieval port trait

use std::fmt::{self, Debug};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::passage::{Passage, ScoreOrder};
use crate::domain::error::DomainError;

/// Search flavour requested from a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Semantic,
    Keyword,
    Hybrid,
}

impl SearchMode {
    /// Parse a model reply, accepting the first recognised mode word
    pub fn from_reply(reply: &str) -> Option<Self> {
        let lowered = reply.to_lowercase();
        ["semantic", "keyword", "hybrid"]
            .into_iter()
            .find(|word| lowered.contains(word))
            .and_then(|word| word.parse().ok())
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for SearchMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(DomainError::validation(format!(
                "Unknown search mode '{}'",
                other
            ))),
        }
    }
}

/// Search parameters for a retrieval call
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Query text to search for
    pub query: String,

    /// Number of passages to return
    pub top_k: usize,

    /// Requested search flavour; backends may ignore it
    pub mode: SearchMode,
}

impl SearchParams {
    /// Create new search parameters
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: 5,
            mode: SearchMode::default(),
        }
    }

    /// Set number of results
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set search mode
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Interface to an external nearest-neighbour search
///
/// Implementations return passages in the backend's own ranking; the retrieval
/// step normalizes scores according to [`RetrievalPort::score_order`].
#[async_trait]
pub trait RetrievalPort: Send + Sync + Debug {
    /// Get the provider type name
    fn provider_type(&self) -> &'static str;

    /// How raw scores should be interpreted
    fn score_order(&self) -> ScoreOrder {
        ScoreOrder::HigherIsBetter
    }

    /// Retrieve passages for a query
    async fn retrieve(&self, params: SearchParams) -> Result<Vec<Passage>, DomainError>;
}
