//! Generation-backed reranker
//!
//! Scores each passage independently with a 0.0 - 1.0 relevance prompt and
//! sorts by that score. Passages whose scoring call fails keep their
//! retrieval score, so one bad call does not reorder everything.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::generation::{GenerationPort, GenerationRequest};
use crate::domain::rerank::Reranker;
use crate::domain::retrieval::Passage;
use crate::domain::DomainError;
use crate::infrastructure::prompts::{render, RERANK_SCORE};
use crate::infrastructure::reformulation::truncate_chars;
use crate::infrastructure::verification::parse_unit_score;

/// Characters of each passage shown to the model
const PASSAGE_CHARS: usize = 1000;

#[derive(Debug)]
pub struct LlmReranker {
    generation: Arc<dyn GenerationPort>,
}

impl LlmReranker {
    pub fn new(generation: Arc<dyn GenerationPort>) -> Self {
        Self { generation }
    }

    async fn score(&self, query: &str, passage: &Passage) -> Option<f32> {
        let prompt = render(
            RERANK_SCORE,
            &[
                ("query", query),
                ("passage", truncate_chars(&passage.content, PASSAGE_CHARS)),
            ],
        );
        let request = GenerationRequest::new(prompt)
            .with_max_length(10)
            .with_temperature(0.0);

        match self.generation.generate(request).await {
            Ok(reply) => parse_unit_score(&reply),
            Err(e) => {
                warn!("Rerank scoring failed for {}: {}", passage.source_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(&self, query: &str, passages: &[Passage]) -> Result<Vec<Passage>, DomainError> {
        let scores = join_all(passages.iter().map(|p| self.score(query, p))).await;

        if scores.iter().all(Option::is_none) && !passages.is_empty() {
            return Err(DomainError::rerank_failed("No passage could be scored"));
        }

        let mut reranked: Vec<Passage> = passages
            .iter()
            .zip(scores)
            .map(|(p, score)| {
                let fallback = p.score;
                p.clone().with_score(score.unwrap_or(fallback))
            })
            .collect();
        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!("Reranked {} passages", reranked.len());
        Ok(reranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generation::mock::MockGenerationPort;

    #[tokio::test]
    async fn test_sorts_by_model_score() {
        let generation = Arc::new(
            MockGenerationPort::new("0.1")
                .with_rule("Passage: strong match", "0.9")
                .with_rule("Passage: partial match", "0.5"),
        );
        let reranker = LlmReranker::new(generation);
        let passages = vec![
            Passage::new("weak", "1"),
            Passage::new("partial match", "2"),
            Passage::new("strong match", "3"),
        ];

        let reranked = reranker.rerank("query", &passages).await.unwrap();

        let order: Vec<_> = reranked.iter().map(|p| p.source_id.as_str()).collect();
        assert_eq!(order, vec!["3", "2", "1"]);
    }

    #[tokio::test]
    async fn test_all_failures_is_an_error() {
        let reranker = LlmReranker::new(Arc::new(MockGenerationPort::failing("down")));
        let err = reranker
            .rerank("q", &[Passage::new("a", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RerankFailed { .. }));
    }
}
