use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::absorb;
use crate::domain::generation::GenerationRequest;
use crate::domain::retrieval::SearchMode;
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::prompts::{render, SEARCH_MODE};

/// Ask the model which search flavour suits the query; hybrid when unsure
#[derive(Debug, Clone, Default)]
pub struct SearchModeStep;

#[async_trait]
impl WorkflowStep for SearchModeStep {
    fn kind(&self) -> &'static str {
        "determine_search_mode"
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::SearchMode]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let prompt = render(SEARCH_MODE, &[("query", state.query().text())]);
        let request = GenerationRequest::new(prompt)
            .with_max_length(5)
            .with_temperature(0.0);

        let mode = match ports.generation.generate(request).await {
            Ok(reply) => SearchMode::from_reply(&reply).unwrap_or_else(|| {
                debug!("Unrecognised search mode reply {:?}, using hybrid", reply);
                SearchMode::Hybrid
            }),
            Err(e) => {
                absorb(state, self.kind(), format!("mode selection failed, using hybrid: {}", e));
                SearchMode::Hybrid
            }
        };

        state.search_mode = Some(mode);
        Ok(json!({ "mode": mode.to_string() }))
    }
}
