//! Infrastructure services

mod rag_service;

pub use rag_service::{AnswerResult, RagEngine};
