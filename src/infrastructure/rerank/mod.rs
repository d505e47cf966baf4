//! Reranker implementations

mod llm_reranker;

pub use llm_reranker::LlmReranker;
