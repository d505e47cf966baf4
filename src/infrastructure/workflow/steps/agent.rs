use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::absorb;
use crate::domain::generation::{GenerationRequest, RetrievalTool, RETRIEVAL_TOOL_NAME};
use crate::domain::workflow::{Ports, StateField, WorkflowState, WorkflowStep};
use crate::domain::DomainError;
use crate::infrastructure::prompts::{render, AGENT_INSTRUCTION, SPECULATIVE_INSTRUCTION};

/// How the agent is asked to use the retrieval tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStyle {
    /// Search first, then answer
    Agentic,
    /// Draft first, then check the draft with searches
    Speculative,
}

impl AgentStyle {
    fn instruction(&self) -> &'static str {
        match self {
            Self::Agentic => AGENT_INSTRUCTION,
            Self::Speculative => SPECULATIVE_INSTRUCTION,
        }
    }
}

/// Let a tool-calling model answer on its own.
///
/// Never fails: when the backend cannot call tools or the call errors, the
/// outcome is recorded as unsuccessful and the graph routes to plain
/// retrieval.
#[derive(Debug, Clone)]
pub struct AgentStep {
    style: AgentStyle,
    top_k: usize,
    max_length: u32,
}

impl AgentStep {
    pub fn new(style: AgentStyle, top_k: usize, max_length: u32) -> Self {
        Self {
            style,
            top_k,
            max_length,
        }
    }
}

#[async_trait]
impl WorkflowStep for AgentStep {
    fn kind(&self) -> &'static str {
        match self.style {
            AgentStyle::Agentic => "agent",
            AgentStyle::Speculative => "speculative_agent",
        }
    }

    fn produces(&self) -> Vec<StateField> {
        vec![StateField::AgentOutcome]
    }

    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError> {
        let tool = RetrievalTool::new(ports.retrieval.clone(), self.top_k);
        let prompt = render(
            self.style.instruction(),
            &[
                ("tool", RETRIEVAL_TOOL_NAME),
                ("query", state.query().original()),
            ],
        );
        let request = GenerationRequest::new(prompt).with_max_length(self.max_length);

        match ports.generation.generate_with_tool(request, &tool).await {
            Ok(answer) if !answer.trim().is_empty() => {
                info!("Agent answered with {} chars", answer.len());
                state.final_answer = Some(answer.trim().to_string());
                state.agent_succeeded = Some(true);
            }
            Ok(_) => {
                absorb(state, self.kind(), "agent returned an empty answer");
                state.agent_succeeded = Some(false);
            }
            Err(e) => {
                absorb(state, self.kind(), format!("falling back to retrieval: {}", e));
                state.agent_succeeded = Some(false);
            }
        }

        Ok(json!({ "succeeded": state.agent_succeeded }))
    }
}
