//! Workflow error types

use thiserror::Error;

use crate::domain::error::DomainError;

/// Errors raised while building or running a workflow graph
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Duplicate step: {0}")]
    DuplicateStep(String),

    #[error("Workflow '{0}' has no entry step")]
    MissingEntry(String),

    #[error("Step '{0}' has no outgoing edge")]
    MissingEdge(String),

    #[error("Step '{0}' cannot reach the end of the workflow")]
    UnreachableEnd(String),

    #[error("Step '{step}' reads {field} before any step produces it")]
    UnsatisfiedField { step: String, field: String },

    #[error("Router of step '{step}' chose undeclared target '{target}'")]
    InvalidRoute { step: String, target: String },

    #[error("Step execution failed in '{step}': {message}")]
    StepExecution { step: String, message: String },

    #[error("Generation failed in terminal step '{step}': {message}")]
    TerminalStep { step: String, message: String },

    #[error("Timeout in step '{step}' after {timeout_ms}ms")]
    Timeout { step: String, timeout_ms: u64 },

    #[error("Workflow exceeded {0} steps")]
    MaxStepsExceeded(usize),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl WorkflowError {
    pub fn step_not_found(name: impl Into<String>) -> Self {
        Self::StepNotFound(name.into())
    }

    pub fn duplicate_step(name: impl Into<String>) -> Self {
        Self::DuplicateStep(name.into())
    }

    pub fn missing_entry(workflow: impl Into<String>) -> Self {
        Self::MissingEntry(workflow.into())
    }

    pub fn missing_edge(step: impl Into<String>) -> Self {
        Self::MissingEdge(step.into())
    }

    pub fn unreachable_end(step: impl Into<String>) -> Self {
        Self::UnreachableEnd(step.into())
    }

    pub fn unsatisfied_field(step: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnsatisfiedField {
            step: step.into(),
            field: field.into(),
        }
    }

    pub fn invalid_route(step: impl Into<String>, target: impl Into<String>) -> Self {
        Self::InvalidRoute {
            step: step.into(),
            target: target.into(),
        }
    }

    pub fn step_execution(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepExecution {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn terminal_step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TerminalStep {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn timeout(step: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            step: step.into(),
            timeout_ms,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<WorkflowError> for DomainError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::TerminalStep { step, message } => {
                DomainError::generation_failed(step, message)
            }
            WorkflowError::StepExecution { .. }
            | WorkflowError::Timeout { .. }
            | WorkflowError::MaxStepsExceeded(_)
            | WorkflowError::InvalidRoute { .. } => DomainError::internal(err.to_string()),
            WorkflowError::Validation(message) => DomainError::validation(message),
            other => DomainError::configuration(other.to_string()),
        }
    }
}
