//! Domain layer - Core orchestration types and ports

pub mod error;
pub mod fusion;
pub mod generation;
pub mod iteration;
pub mod reformulation;
pub mod relevance;
pub mod rerank;
pub mod retrieval;
pub mod strategy;
pub mod verification;
pub mod workflow;

pub use error::DomainError;
pub use fusion::{reciprocal_rank_fusion, FusedPassage, RankFusion};
pub use generation::{GenerationPort, GenerationRequest, RetrievalTool};
pub use iteration::{IterationController, IterationState, TerminationReason};
pub use reformulation::{QueryReformulator, Reformulation, ReformulationRequest, NO_REWRITE};
pub use relevance::{Assessment, AssessmentMode, GradedPassage, RelevanceAssessor, RelevanceVerdict};
pub use rerank::Reranker;
pub use retrieval::{Context, Passage, RetrievalPort, ScoreOrder, SearchMode, SearchParams};
pub use strategy::{StrategyConfig, StrategyName};
pub use verification::FactVerifier;
pub use workflow::{
    ExecutionOptions, Ports, StepExecutionResult, WorkflowError, WorkflowExecutor, WorkflowGraph,
    WorkflowGraphBuilder, WorkflowResult, WorkflowState, WorkflowStep, END,
};
