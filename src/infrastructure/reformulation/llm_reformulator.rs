//! Generation-backed query reformulator

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::generation::{GenerationPort, GenerationRequest};
use crate::domain::reformulation::{
    check_rewrite, QueryReformulator, RejectReason, Reformulation, ReformulationRequest,
};
use crate::infrastructure::prompts::{render, REFEED_REFORMULATE, REFORMULATE};

/// Passages shown to the model when asking for a rewrite
const CONTEXT_PASSAGES: usize = 3;

/// Characters of context shown to the model
const CONTEXT_CHARS: usize = 1500;

/// Which instruction the reformulator uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReformulationStyle {
    /// Recover from irrelevant results
    Reflective,
    /// Dig for information the current passages miss
    Refeed,
}

#[derive(Debug)]
pub struct LlmQueryReformulator {
    generation: Arc<dyn GenerationPort>,
    style: ReformulationStyle,
}

impl LlmQueryReformulator {
    pub fn new(generation: Arc<dyn GenerationPort>, style: ReformulationStyle) -> Self {
        Self { generation, style }
    }

    fn build_prompt(&self, request: &ReformulationRequest<'_>) -> String {
        let mut context = request
            .context
            .iter()
            .take(CONTEXT_PASSAGES)
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if context.is_empty() {
            context = "(none)".to_string();
        }
        let context = truncate_chars(&context, CONTEXT_CHARS);

        let template = match self.style {
            ReformulationStyle::Reflective => REFORMULATE,
            ReformulationStyle::Refeed => REFEED_REFORMULATE,
        };
        let mut prompt = render(
            template,
            &[
                ("original", request.original),
                ("current", request.current),
                ("context", context),
            ],
        );
        if let Some(draft) = request.draft.filter(|d| !d.trim().is_empty()) {
            prompt.push_str("\n\nCurrent draft answer:\n");
            prompt.push_str(draft);
        }
        prompt
    }
}

#[async_trait]
impl QueryReformulator for LlmQueryReformulator {
    async fn reformulate(&self, request: ReformulationRequest<'_>) -> Reformulation {
        let prompt = self.build_prompt(&request);
        let generation = GenerationRequest::new(prompt)
            .with_max_length(100)
            .with_temperature(0.0);

        let result = match self.generation.generate(generation).await {
            Ok(reply) => check_rewrite(request.current, &reply),
            Err(e) => {
                warn!("Query reformulation failed, keeping current query: {}", e);
                Reformulation::Rejected {
                    reason: RejectReason::Malformed,
                    fallback: request.current.to_string(),
                }
            }
        };

        debug!("Reformulation of {:?}: {:?}", request.current, result);
        result
    }

    fn reformulator_name(&self) -> &'static str {
        match self.style {
            ReformulationStyle::Reflective => "reflective",
            ReformulationStyle::Refeed => "refeed",
        }
    }
}

/// Cut a string to at most `max` characters on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::generation::mock::MockGenerationPort;
    use crate::domain::retrieval::{Context, Passage};

    #[tokio::test]
    async fn test_valid_rewrite() {
        let generation = Arc::new(MockGenerationPort::new("rust borrow checker lifetime rules"));
        let reformulator = LlmQueryReformulator::new(generation.clone(), ReformulationStyle::Reflective);
        let context = Context::from_passages(vec![Passage::new("unrelated text", "d")]);

        let result = reformulator
            .reformulate(ReformulationRequest::new("lifetimes?", "lifetimes?", &context))
            .await;

        assert_eq!(
            result,
            Reformulation::Rewritten("rust borrow checker lifetime rules".to_string())
        );
        let prompt = &generation.prompts()[0];
        assert!(prompt.contains("Original question: lifetimes?"));
        assert!(prompt.contains("unrelated text"));
    }

    #[tokio::test]
    async fn test_sentinel_and_failure() {
        let context = Context::new();

        let reformulator = LlmQueryReformulator::new(
            Arc::new(MockGenerationPort::new("NO_REWRITE")),
            ReformulationStyle::Refeed,
        );
        let result = reformulator
            .reformulate(ReformulationRequest::new("q one", "q one", &context))
            .await;
        assert_eq!(result, Reformulation::Stop);

        let reformulator = LlmQueryReformulator::new(
            Arc::new(MockGenerationPort::failing("timeout")),
            ReformulationStyle::Refeed,
        );
        let result = reformulator
            .reformulate(ReformulationRequest::new("q one", "q two", &context))
            .await;
        assert_eq!(result.query("q two"), "q two");
        assert!(!result.is_rewritten());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
