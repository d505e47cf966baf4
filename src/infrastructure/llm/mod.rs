//! Generation port adapters

pub mod http_client;
mod openai;

pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::{OpenAiGenerator, DEFAULT_MAX_TOOL_ROUNDS};
