//! Workflow step trait and the ports steps run against

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::{StateField, WorkflowState};
use crate::domain::error::DomainError;
use crate::domain::generation::GenerationPort;
use crate::domain::rerank::Reranker;
use crate::domain::retrieval::RetrievalPort;
use crate::domain::verification::FactVerifier;

/// Action to take when a step fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorAction {
    /// Record the failure and continue along the step's edge
    #[default]
    SkipStep,

    /// Stop the workflow and return an error
    FailWorkflow,
}

/// External collaborators available to every step
#[derive(Clone)]
pub struct Ports {
    pub retrieval: Arc<dyn RetrievalPort>,
    pub generation: Arc<dyn GenerationPort>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub verifier: Option<Arc<dyn FactVerifier>>,
}

impl Ports {
    pub fn new(retrieval: Arc<dyn RetrievalPort>, generation: Arc<dyn GenerationPort>) -> Self {
        Self {
            retrieval,
            generation,
            reranker: None,
            verifier: None,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn FactVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }
}

impl Debug for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ports")
            .field("retrieval", &self.retrieval.provider_type())
            .field("generation", &self.generation.provider_name())
            .field("reranker", &self.reranker.is_some())
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

/// A reusable unit of work over [`WorkflowState`]
///
/// `requires` and `produces` feed the graph builder's field check; a step
/// must not read a field it does not list in `requires`.
#[async_trait]
pub trait WorkflowStep: Send + Sync + Debug {
    /// Step kind, used in traces and metrics
    fn kind(&self) -> &'static str;

    fn requires(&self) -> Vec<StateField> {
        Vec::new()
    }

    fn produces(&self) -> Vec<StateField> {
        Vec::new()
    }

    /// Run the step; the returned value is recorded in the trace
    async fn run(&self, state: &mut WorkflowState, ports: &Ports) -> Result<Value, DomainError>;
}
