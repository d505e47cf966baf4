//! Fact verifier implementations

mod llm_verifier;

pub use llm_verifier::{parse_unit_score, LlmFactVerifier};
