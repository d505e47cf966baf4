//! PMP RAG Engine
//!
//! Multi-strategy retrieval-augmented generation orchestration:
//! - Twelve strategies built as workflow graphs over shared steps
//! - Pluggable retrieval, generation, reranking and verification ports
//! - Bounded loops, graceful degradation and cancellable runs

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use infrastructure::services::{AnswerResult, RagEngine};
