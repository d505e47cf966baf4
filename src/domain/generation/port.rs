//! Generation port trait

use std::fmt::Debug;

use async_trait::async_trait;

use super::request::GenerationRequest;
use super::tool::RetrievalTool;
use crate::domain::error::DomainError;

/// Trait for text-generation backends
#[async_trait]
pub trait GenerationPort: Send + Sync + Debug {
    /// Generate text for a prompt
    async fn generate(&self, request: GenerationRequest) -> Result<String, DomainError>;

    /// Generate text while letting the model call the retrieval tool.
    ///
    /// Backends without tool calling keep the default, which reports
    /// `Unsupported` so the caller can fall back.
    async fn generate_with_tool(
        &self,
        _request: GenerationRequest,
        _tool: &RetrievalTool,
    ) -> Result<String, DomainError> {
        Err(DomainError::unsupported(format!(
            "{} does not support tool calling",
            self.provider_name()
        )))
    }

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}
