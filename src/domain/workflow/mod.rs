//! Workflow domain module
//!
//! A workflow is a directed graph of named steps run over one shared
//! [`WorkflowState`]. Edges are direct or conditional; a conditional edge
//! declares every target its router may pick, which lets the builder check
//! that no step reads a state field before some earlier step produced it on
//! every path. The special target [`END`] finishes the run.

mod error;
mod executor;
mod graph;
mod state;
mod step;

pub use error::WorkflowError;
pub use executor::{ExecutionOptions, StepExecutionResult, WorkflowExecutor, WorkflowResult};
pub use graph::{Edge, Node, Router, WorkflowGraph, WorkflowGraphBuilder, END};
pub use state::{Query, StateField, WorkflowState, NO_RELEVANT_INFORMATION};
pub use step::{OnErrorAction, Ports, WorkflowStep};

#[cfg(test)]
pub(crate) use graph::test_steps;
