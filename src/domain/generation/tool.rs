//! Retrieval tool offered to tool-calling generators

use std::sync::Arc;

use serde_json::json;

use crate::domain::error::DomainError;
use crate::domain::retrieval::{normalize_ranking, Passage, RetrievalPort, SearchParams};

/// Name the tool is advertised under
pub const RETRIEVAL_TOOL_NAME: &str = "retrieve_documents";

/// Function-style description of a tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Document search exposed to an agent
#[derive(Debug, Clone)]
pub struct RetrievalTool {
    retrieval: Arc<dyn RetrievalPort>,
    top_k: usize,
}

impl RetrievalTool {
    pub fn new(retrieval: Arc<dyn RetrievalPort>, top_k: usize) -> Self {
        Self {
            retrieval,
            top_k: top_k.max(1),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: RETRIEVAL_TOOL_NAME.to_string(),
            description: "Search the document index for passages relevant to a query. \
                          Use this when you need facts from the documents."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Run a search and render the passages for the model
    pub async fn invoke(&self, query: &str) -> Result<String, DomainError> {
        let params = SearchParams::new(query).with_top_k(self.top_k);
        let passages = self.retrieval.retrieve(params).await?;
        let passages = normalize_ranking(passages, self.retrieval.score_order());
        Ok(format_documents(&passages))
    }
}

/// Render passages as numbered document blocks
pub fn format_documents(passages: &[Passage]) -> String {
    if passages.is_empty() {
        return "No documents found.".to_string();
    }

    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("===== Document {} =====\n{}", i, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
