//! OpenAI Chat Completions provider

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::core::config::ProviderConfig;
use crate::core::{AgentError, Content, Message, Result, Role, ToolCall, ToolSchema, Usage};
use crate::llm::traits::{ChatRequest, Provider, ProviderResponse, ToolChoice};

/// OpenAI Chat Completions client
pub struct OpenAiProvider {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Create a provider against an explicit base URL
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Url,
        client: Client,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Create a provider from configuration, reading the key from the environment
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AgentError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::new(
            config.api_key()?,
            config.model_name(),
            config.base_url()?,
            client,
        ))
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any | ToolChoice::Required => json!("required"),
        ToolChoice::None => json!("none"),
        ToolChoice::Named(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

fn tools_to_wire(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

/// Text of a message that may only carry text blocks
fn text_only(message: &Message) -> Result<String> {
    let mut text = String::new();
    for content in &message.content {
        match content {
            Content::Text { text: piece } => text.push_str(piece),
            Content::ToolUse(_) => {
                return Err(AgentError::fatal(
                    "tool use content is only valid in assistant messages",
                ))
            }
            Content::ToolResult(_) => {
                return Err(AgentError::fatal(
                    "tool result content is only valid in tool messages",
                ))
            }
        }
    }
    Ok(text)
}

/// Translate history to OpenAI chat messages, system prompt first
fn messages_to_wire(system: &str, messages: &[Message]) -> Result<Vec<Value>> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if !system.is_empty() {
        wire.push(json!({"role": "system", "content": system}));
    }

    for message in messages {
        match message.role {
            Role::System => {
                wire.push(json!({"role": "system", "content": text_only(message)?}));
            }
            Role::User => {
                wire.push(json!({"role": "user", "content": text_only(message)?}));
            }
            Role::Assistant => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for content in &message.content {
                    match content {
                        Content::Text { text: piece } => text.push_str(piece),
                        Content::ToolUse(call) => tool_calls.push(json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })),
                        Content::ToolResult(_) => {
                            return Err(AgentError::fatal(
                                "tool result content is only valid in tool messages",
                            ))
                        }
                    }
                }

                let mut converted = json!({"role": "assistant"});
                converted["content"] = if text.is_empty() && !tool_calls.is_empty() {
                    Value::Null
                } else {
                    json!(text)
                };
                if !tool_calls.is_empty() {
                    converted["tool_calls"] = json!(tool_calls);
                }
                wire.push(converted);
            }
            Role::Tool => {
                for content in &message.content {
                    match content {
                        Content::ToolResult(result) => wire.push(json!({
                            "role": "tool",
                            "tool_call_id": result.call_id,
                            "content": result.content,
                        })),
                        _ => {
                            return Err(AgentError::fatal(
                                "tool messages may only carry tool results",
                            ))
                        }
                    }
                }
            }
        }
    }

    Ok(wire)
}

/// Normalize a Chat Completions response body
fn parse_response(raw: Value) -> Result<ProviderResponse> {
    let message = raw
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| AgentError::fatal("OpenAI response has no choices"))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call.get("id").and_then(Value::as_str);
            let function = call.get("function");
            let name = function.and_then(|f| f.get("name")).and_then(Value::as_str);
            let (Some(id), Some(name)) = (id, name) else {
                return Err(AgentError::fatal("tool call missing id or function name"));
            };

            let raw_args = function
                .and_then(|f| f.get("arguments"))
                .and_then(Value::as_str)
                .unwrap_or("{}");
            let arguments: Value = serde_json::from_str(raw_args).map_err(|e| {
                AgentError::fatal(format!("invalid arguments for tool '{}': {}", name, e))
            })?;
            if !arguments.is_object() {
                return Err(AgentError::fatal(format!(
                    "arguments for tool '{}' are not a JSON object",
                    name
                )));
            }
            tool_calls.push(ToolCall::new(id, name, arguments));
        }
    }

    let usage = raw
        .get("usage")
        .map(|u| {
            Usage::new(
                u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0),
            )
        })
        .unwrap_or_default();

    Ok(ProviderResponse {
        text,
        tool_calls,
        usage,
        raw,
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ProviderResponse> {
        let send_tools = request.tool_choice.check(request.tools)?;
        let messages = messages_to_wire(request.system, request.messages)?;

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        });
        if send_tools {
            body["tools"] = json!(tools_to_wire(request.tools));
            body["tool_choice"] = tool_choice_to_wire(request.tool_choice);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending OpenAI chat completion request"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(AgentError::from_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(AgentError::from_transport)?;

        if !status.is_success() {
            return Err(AgentError::from_status(status.as_u16(), text));
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| AgentError::fatal(format!("malformed OpenAI response: {}", e)))?;
        parse_response(raw)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
