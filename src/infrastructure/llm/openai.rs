use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::http_client::HttpClientTrait;
use crate::domain::generation::{GenerationPort, GenerationRequest, RetrievalTool};
use crate::domain::DomainError;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default number of model turns in a tool-calling exchange
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 4;

/// Generation port backed by an OpenAI-compatible chat completions API
#[derive(Debug)]
pub struct OpenAiGenerator<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
    model: String,
    max_tool_rounds: u32,
}

impl<C: HttpClientTrait> OpenAiGenerator<C> {
    pub fn new(client: C, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, model, DEFAULT_OPENAI_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let auth_header = format!("Bearer {}", api_key.into());
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            auth_header,
            base_url,
            model: model.into(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn initial_messages(request: &GenerationRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        messages
    }

    fn build_body(
        &self,
        request: &GenerationRequest,
        messages: &[serde_json::Value],
    ) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_length,
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        body
    }

    async fn complete(&self, body: &serde_json::Value) -> Result<OpenAiResponseMessage, DomainError> {
        let response = self
            .client
            .post_json(&self.chat_completions_url(), self.headers(), body)
            .await
            .map_err(|e| DomainError::generation_failed("openai", e.to_string()))?;

        let response: OpenAiResponse = serde_json::from_value(response).map_err(|e| {
            DomainError::generation_failed("openai", format!("Failed to parse response: {}", e))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| DomainError::generation_failed("openai", "No choices in response"))
    }
}

#[async_trait]
impl<C: HttpClientTrait> GenerationPort for OpenAiGenerator<C> {
    async fn generate(&self, request: GenerationRequest) -> Result<String, DomainError> {
        let messages = Self::initial_messages(&request);
        let body = self.build_body(&request, &messages);

        let message = self.complete(&body).await?;
        match message.content {
            Some(content) if !content.trim().is_empty() => Ok(content.trim().to_string()),
            _ => Err(DomainError::generation_failed("openai", "Empty response")),
        }
    }

    async fn generate_with_tool(
        &self,
        request: GenerationRequest,
        tool: &RetrievalTool,
    ) -> Result<String, DomainError> {
        let definition = tool.definition();
        let tools = json!([{
            "type": "function",
            "function": {
                "name": definition.name,
                "description": definition.description,
                "parameters": definition.parameters,
            }
        }]);

        let mut messages = Self::initial_messages(&request);

        for round in 0..self.max_tool_rounds {
            let mut body = self.build_body(&request, &messages);
            body["tools"] = tools.clone();

            let message = self.complete(&body).await?;

            if message.tool_calls.is_empty() {
                return match message.content {
                    Some(content) if !content.trim().is_empty() => Ok(content.trim().to_string()),
                    _ => Err(DomainError::generation_failed("openai", "Empty response")),
                };
            }

            debug!(
                "Tool round {}: {} call(s) requested",
                round + 1,
                message.tool_calls.len()
            );
            messages.push(json!({
                "role": "assistant",
                "content": message.content,
                "tool_calls": message.tool_calls,
            }));

            for call in &message.tool_calls {
                if call.function.name != definition.name {
                    return Err(DomainError::generation_failed(
                        "openai",
                        format!("Model called unknown tool '{}'", call.function.name),
                    ));
                }

                let args: ToolArguments = serde_json::from_str(&call.function.arguments)
                    .map_err(|e| {
                        DomainError::generation_failed(
                            "openai",
                            format!("Invalid tool arguments: {}", e),
                        )
                    })?;

                let output = tool.invoke(&args.query).await?;
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": output,
                }));
            }
        }

        warn!("Tool calling stopped after {} rounds", self.max_tool_rounds);
        Err(DomainError::generation_failed(
            "openai",
            format!("No final answer after {} tool rounds", self.max_tool_rounds),
        ))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// OpenAI API types

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OpenAiToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ToolArguments {
    query: String,
}

fn function_type() -> String {
    "function".to_string()
}
