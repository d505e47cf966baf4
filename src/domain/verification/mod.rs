//! Fact verifier port

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::domain::error::DomainError;
use crate::domain::retrieval::Passage;

/// External judge scoring how well an answer is supported by its sources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FactVerifier: Send + Sync {
    /// Confidence in 0.0 - 1.0 that `answer` is supported by `sources`
    async fn verify(
        &self,
        query: &str,
        answer: &str,
        sources: &[Passage],
    ) -> Result<f32, DomainError>;
}
