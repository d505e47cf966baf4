//! Reranker port

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::domain::error::DomainError;
use crate::domain::retrieval::Passage;

/// External model that reorders passages for a query
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return the passages in the reranker's preferred order
    async fn rerank(&self, query: &str, passages: &[Passage]) -> Result<Vec<Passage>, DomainError>;
}
