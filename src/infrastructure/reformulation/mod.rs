//! Query reformulator implementations

mod llm_reformulator;

pub use llm_reformulator::{truncate_chars, LlmQueryReformulator, ReformulationStyle};
