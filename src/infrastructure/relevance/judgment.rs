//! LLM yes/no relevance judgment

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::generation::{GenerationPort, GenerationRequest};
use crate::domain::relevance::{Assessment, RelevanceAssessor, RelevanceVerdict};
use crate::domain::retrieval::Context;
use crate::infrastructure::prompts::{render, RELEVANCE_JUDGMENT};

/// Contexts shorter than this are judged insufficient without asking
pub const MIN_CONTEXT_CHARS: usize = 50;

/// Asks the generation port whether the context answers the query
#[derive(Debug)]
pub struct JudgmentAssessor {
    generation: Arc<dyn GenerationPort>,
}

impl JudgmentAssessor {
    pub fn new(generation: Arc<dyn GenerationPort>) -> Self {
        Self { generation }
    }
}

#[async_trait]
impl RelevanceAssessor for JudgmentAssessor {
    async fn assess(&self, query: &str, context: &Context) -> Assessment {
        let joined = context.join("\n");
        if joined.trim().chars().count() < MIN_CONTEXT_CHARS {
            debug!("Context too short for judgment ({} chars)", joined.len());
            return Assessment::verdict_only(RelevanceVerdict::insufficient());
        }

        let prompt = render(RELEVANCE_JUDGMENT, &[("query", query), ("context", &joined)]);
        let request = GenerationRequest::new(prompt)
            .with_max_length(5)
            .with_temperature(0.0);

        let verdict = match self.generation.generate(request).await {
            Ok(reply) => match parse_yes_no(&reply) {
                Some(answer) => RelevanceVerdict::new(answer, if answer { 1.0 } else { 0.0 }),
                None => {
                    warn!("Unparseable relevance judgment: {:?}", reply);
                    RelevanceVerdict::insufficient()
                }
            },
            Err(e) => {
                warn!("Relevance judgment failed, treating context as insufficient: {}", e);
                RelevanceVerdict::insufficient()
            }
        };

        debug!("Judgment verdict: relevant={}", verdict.is_relevant);
        Assessment::verdict_only(verdict)
    }

    fn assessor_name(&self) -> &'static str {
        "judgment"
    }
}

/// Read the first token of a reply as a boolean
pub fn parse_yes_no(reply: &str) -> Option<bool> {
    let token = reply
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    match token.as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}
