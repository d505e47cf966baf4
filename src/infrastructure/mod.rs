//! Infrastructure layer - Adapters, workflow steps and the engine

pub mod llm;
pub mod logging;
pub mod observability;
pub mod prompts;
pub mod reformulation;
pub mod relevance;
pub mod rerank;
pub mod retrieval;
pub mod services;
pub mod strategy;
pub mod verification;
pub mod workflow;
