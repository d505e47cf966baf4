//! Generation port, request types and the agent retrieval tool

mod port;
mod request;
mod tool;

pub use port::GenerationPort;
pub use request::{GenerationRequest, DEFAULT_MAX_LENGTH};
pub use tool::{format_documents, RetrievalTool, ToolDefinition, RETRIEVAL_TOOL_NAME};

#[cfg(test)]
pub use port::mock;
