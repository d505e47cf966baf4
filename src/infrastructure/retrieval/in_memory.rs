//! In-memory retrieval backend for development and testing

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::retrieval::{Passage, RetrievalPort, SearchMode, SearchParams};
use crate::domain::DomainError;
use crate::infrastructure::relevance::{query_terms, score_passage};

/// Term-scored passage index held in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryRetriever {
    passages: Arc<RwLock<Vec<Passage>>>,
}

impl InMemoryRetriever {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index holding `passages`
    pub fn with_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages: Arc::new(RwLock::new(passages)),
        }
    }

    /// Load passages from a JSON array of `{"content", "source_id"}` objects
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DomainError::configuration(format!("Cannot read corpus {}: {}", path.display(), e))
        })?;
        let passages: Vec<Passage> = serde_json::from_str(&raw).map_err(|e| {
            DomainError::configuration(format!("Invalid corpus {}: {}", path.display(), e))
        })?;

        info!("Loaded {} passages from {}", passages.len(), path.display());
        Ok(Self::with_passages(passages))
    }

    /// Append passages to the index
    pub async fn add_passages(&self, passages: Vec<Passage>) -> usize {
        let count = passages.len();
        self.passages.write().await.extend(passages);
        count
    }

    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.passages.read().await.is_empty()
    }
}

#[async_trait]
impl RetrievalPort for InMemoryRetriever {
    fn provider_type(&self) -> &'static str {
        "in_memory"
    }

    async fn retrieve(&self, params: SearchParams) -> Result<Vec<Passage>, DomainError> {
        let terms = query_terms(&params.query);
        let passages = self.passages.read().await;

        let mut scored: Vec<Passage> = passages
            .iter()
            .filter(|p| match params.mode {
                SearchMode::Keyword => {
                    let lowered = p.content.to_lowercase();
                    !terms.is_empty() && terms.iter().all(|t| lowered.contains(t.as_str()))
                }
                SearchMode::Semantic | SearchMode::Hybrid => true,
            })
            .map(|p| {
                let score = score_passage(&terms, &p.content);
                p.clone().with_score(score)
            })
            .filter(|p| p.score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(params.top_k);

        debug!(
            "In-memory {} search for {:?} matched {} passages",
            params.mode,
            params.query,
            scored.len()
        );
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> InMemoryRetriever {
        InMemoryRetriever::with_passages(vec![
            Passage::new("Tokio is an asynchronous runtime for Rust.", "tokio.md"),
            Passage::new("Serde serializes Rust data structures.", "serde.md"),
            Passage::new("The Tokio runtime schedules tasks across worker threads.", "sched.md"),
        ])
    }

    #[tokio::test]
    async fn test_semantic_ranks_by_term_overlap() {
        let results = corpus()
            .retrieve(SearchParams::new("tokio runtime").with_top_k(5))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|p| p.content.contains("untime")));
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_keyword_requires_every_term() {
        let results = corpus()
            .retrieve(
                SearchParams::new("rust serializes")
                    .with_mode(SearchMode::Keyword)
                    .with_top_k(5),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_id, "serde.md");
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let results = corpus()
            .retrieve(SearchParams::new("rust tokio serde").with_top_k(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_add_passages() {
        let retriever = InMemoryRetriever::new();
        assert!(retriever.is_empty().await);
        retriever.add_passages(vec![Passage::new("text", "a")]).await;
        assert_eq!(retriever.len().await, 1);
    }

    #[tokio::test]
    async fn test_from_missing_file_is_configuration_error() {
        let err = InMemoryRetriever::from_json_file("/nonexistent/corpus.json")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration { .. }));
    }
}
