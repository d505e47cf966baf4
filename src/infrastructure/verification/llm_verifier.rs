//! Generation-backed fact verifier

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::domain::generation::{GenerationPort, GenerationRequest};
use crate::domain::retrieval::Passage;
use crate::domain::verification::FactVerifier;
use crate::domain::DomainError;
use crate::infrastructure::prompts::{render, VERIFY_FACTS};

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

/// Asks the generation port how well the sources support an answer
#[derive(Debug)]
pub struct LlmFactVerifier {
    generation: Arc<dyn GenerationPort>,
}

impl LlmFactVerifier {
    pub fn new(generation: Arc<dyn GenerationPort>) -> Self {
        Self { generation }
    }
}

#[async_trait]
impl FactVerifier for LlmFactVerifier {
    async fn verify(
        &self,
        query: &str,
        answer: &str,
        sources: &[Passage],
    ) -> Result<f32, DomainError> {
        let context = sources
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render(
            VERIFY_FACTS,
            &[("query", query), ("answer", answer), ("context", &context)],
        );

        let reply = self
            .generation
            .generate(GenerationRequest::new(prompt).with_max_length(10).with_temperature(0.0))
            .await
            .map_err(|e| DomainError::verification_failed(e.to_string()))?;

        let confidence = parse_unit_score(&reply).ok_or_else(|| {
            DomainError::verification_failed(format!("No score in verifier reply: {:?}", reply))
        })?;

        debug!("Verifier confidence {:.2}", confidence);
        Ok(confidence)
    }
}

/// First number in a reply, read as a 0.0 - 1.0 score.
///
/// Values above 1 are taken as a 0 - 10 scale.
pub fn parse_unit_score(reply: &str) -> Option<f32> {
    let value: f32 = NUMBER.find(reply)?.as_str().parse().ok()?;
    let value = if value > 1.0 { value / 10.0 } else { value };
    Some(value.clamp(0.0, 1.0))
}
