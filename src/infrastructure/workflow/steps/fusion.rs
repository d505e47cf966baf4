use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::debug;

use super::absorb;
use super::retrieve::retrieve_passages;
use crate::domain::fusion::RankFusion;
use crate::domain::generation::GenerationRequest;
use crate::domain::iteration::IterationController;
use crate::domain::retrieval::{Context, SearchMode};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::prompts::{render, QUERY_VARIANTS};

/// Build the query variants; the original query is always the first
#[derive(Debug, Clone)]
pub struct QueryVariantsStep {
    count: usize,
}

impl QueryVariantsStep {
    pub fn new(count: usize) -> Self {
        Self { count: count.max(1) }
    }
}

#[async_trait]
impl WorkflowStep for QueryVariantsStep {
    fn kind(&self) -> &'static str {
        "generate_query_variants"
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::QueryVariants]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let query = state.query().original().to_string();
        let wanted = self.count - 1;
        let mut variants = vec![query.clone()];

        if wanted > 0 {
            let prompt = render(
                QUERY_VARIANTS,
                &[("count", &wanted.to_string()), ("query", &query)],
            );
            let request = GenerationRequest::new(prompt)
                .with_max_length(200)
                .with_temperature(0.7);

            match ports.generation.generate(request).await {
                Ok(reply) => {
                    for line in reply.lines() {
                        push_variant(&mut variants, clean_variant(line), self.count);
                    }
                }
                Err(e) => absorb(state, self.kind(), format!("using built-in variants: {}", e)),
            }

            if variants.len() < self.count {
                debug!("Model gave {} usable variants, filling in", variants.len() - 1);
                for variant in fallback_variants(&query) {
                    push_variant(&mut variants, variant, self.count);
                }
            }
        }

        debug!("Query variants: {:?}", variants);
        state.query_variants = variants;
        Ok(json!({ "variants": state.query_variants }))
    }
}

/// Retrieve every variant concurrently; results keep variant order
#[derive(Debug, Clone)]
pub struct RetrieveVariantsStep {
    top_k: usize,
}

impl RetrieveVariantsStep {
    pub fn new(top_k: usize) -> Self {
        Self { top_k: top_k.max(1) }
    }
}

#[async_trait]
impl WorkflowStep for RetrieveVariantsStep {
    fn kind(&self) -> &'static str {
        "retrieve_variants"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::QueryVariants]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::VariantResults]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let searches = state
            .query_variants
            .iter()
            .map(|variant| retrieve_passages(ports, variant, self.top_k, SearchMode::Semantic));
        let results = join_all(searches).await;

        let mut lists = Vec::with_capacity(results.len());
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(passages) => lists.push(passages),
                Err(e) => {
                    absorb(state, self.kind(), format!("variant {} retrieval failed: {}", i, e));
                    lists.push(Vec::new());
                }
            }
        }

        let counts: Vec<usize> = lists.iter().map(Vec::len).collect();
        state.variant_results = lists;
        Ok(json!({ "results": counts }))
    }
}

/// Fuse the per-variant rankings into the context
#[derive(Debug, Clone)]
pub struct FuseRankingsStep {
    fusion: RankFusion,
    limit: usize,
}

impl FuseRankingsStep {
    pub fn new(k: u32, limit: usize) -> Self {
        Self {
            fusion: RankFusion::new(k),
            limit: limit.max(1),
        }
    }
}

#[async_trait]
impl WorkflowStep for FuseRankingsStep {
    fn kind(&self) -> &'static str {
        "fuse_rankings"
    }

    fn requires(&self) -> Vec<StateField> {
        vec![StateField::VariantResults]
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::Context]
    }

    async fn run(&self, state: &mut WorkflowState, _ports: &Ports) -> Result<Value, DomainError> {
        let fused = self.fusion.fuse_passages(&state.variant_results, self.limit);
        IterationController::record(&mut state.iteration, fused.iter().cloned());
        state.context = Context::from_passages(fused);
        state.last_retrieved = state.context.len();

        Ok(json!({ "fused": state.context.len(), "k": self.fusion.k }))
    }
}

/// Deterministic paraphrases used when the model gives none
pub fn fallback_variants(query: &str) -> Vec<String> {
    let reversed = query.split_whitespace().rev().collect::<Vec<_>>().join(" ");
    vec![
        reversed,
        format!("methods for {}", query),
        format!("{} techniques", query),
    ]
}

fn clean_variant(line: &str) -> String {
    line.trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}

fn push_variant(variants: &mut Vec<String>, candidate: String, max: usize) {
    if variants.len() >= max || candidate.is_empty() {
        return;
    }
    if variants.iter().any(|v| v.eq_ignore_ascii_case(&candidate)) {
        return;
    }
    variants.push(candidate);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{passages, ports};
    use super::*;
    use crate::domain::generation::mock::MockGenerationPort;
    use crate::domain::retrieval::mock::MockRetrievalPort;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_variants_from_model_reply() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::new(
            "1. rust memory safety guarantees\n2. how rust prevents memory bugs\n3. extra line",
        ));
        let mut state = WorkflowState::new("rust memory safety", 1);

        QueryVariantsStep::new(3)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(
            state.query_variants,
            vec![
                "rust memory safety",
                "rust memory safety guarantees",
                "how rust prevents memory bugs"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_generation_uses_fallback_variants() {
        let retrieval = Arc::new(MockRetrievalPort::empty());
        let generation = Arc::new(MockGenerationPort::failing("down"));
        let mut state = WorkflowState::new("vector search", 1);

        QueryVariantsStep::new(4)
            .run(&mut state, &ports(&retrieval, &generation))
            .await
            .unwrap();

        assert_eq!(
            state.query_variants,
            vec![
                "vector search",
                "search vector",
                "methods for vector search",
                "vector search techniques"
            ]
        );
        assert_eq!(state.degradations.len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_and_fuse_variants() {
        let retrieval = Arc::new(MockRetrievalPort::scripted(vec![
            Ok(passages(&["A", "B", "C"])),
            Ok(passages(&["B", "A", "D"])),
        ]));
        let generation = Arc::new(MockGenerationPort::new(""));
        let ports = ports(&retrieval, &generation);
        let mut state = WorkflowState::new("q", 1);
        state.query_variants = vec!["first".to_string(), "second".to_string()];

        RetrieveVariantsStep::new(5).run(&mut state, &ports).await.unwrap();
        FuseRankingsStep::new(60, 3).run(&mut state, &ports).await.unwrap();

        assert_eq!(retrieval.queries(), vec!["first", "second"]);
        assert_eq!(state.context.join(","), "A,B,C");
    }

    #[tokio::test]
    async fn test_failed_variant_is_skipped() {
        let retrieval = Arc::new(MockRetrievalPort::scripted(vec![
            Err("timeout".to_string()),
            Ok(passages(&["B"])),
        ]));
        let generation = Arc::new(MockGenerationPort::new(""));
        let ports = ports(&retrieval, &generation);
        let mut state = WorkflowState::new("q", 1);
        state.query_variants = vec!["first".to_string(), "second".to_string()];

        RetrieveVariantsStep::new(5).run(&mut state, &ports).await.unwrap();
        FuseRankingsStep::new(60, 3).run(&mut state, &ports).await.unwrap();

        assert!(state.variant_results[0].is_empty());
        assert_eq!(state.context.join(","), "B");
        assert_eq!(state.degradations.len(), 1);
    }
}
