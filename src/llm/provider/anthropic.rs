//! Anthropic Messages API provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::core::config::ProviderConfig;
use crate::core::{AgentError, Content, Message, Result, Role, ToolCall, ToolSchema, Usage};
use crate::llm::traits::{ChatRequest, Provider, ProviderResponse, ToolChoice};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client
pub struct AnthropicProvider {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

/// Messages API request body
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

/// Messages API response body
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicProvider {
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

    /// Build the messages endpoint URL
    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{}/v1/messages", base)
    }
}

/// Map a tool choice to Anthropic's object form
fn tool_choice_to_wire(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"type": "auto"}),
        ToolChoice::Any | ToolChoice::Required => json!({"type": "any"}),
        ToolChoice::None => json!({"type": "none"}),
        ToolChoice::Named(name) => json!({"type": "tool", "name": name}),
    }
}

/// Translate history to Anthropic messages.
///
/// Tool turns become user turns of `tool_result` blocks; back-to-back tool
/// turns are merged into one so roles keep alternating.
fn messages_to_wire(messages: &[Message]) -> Result<Vec<WireMessage>> {
    let mut wire: Vec<WireMessage> = Vec::with_capacity(messages.len());
    let mut last_was_tool = false;

    for message in messages {
        match message.role {
            Role::System => {
                return Err(AgentError::fatal(
                    "system messages are not allowed in Anthropic history; use the system prompt",
                ));
            }
            Role::User | Role::Assistant => {
                let mut blocks = Vec::with_capacity(message.content.len());
                for content in &message.content {
                    match content {
                        Content::Text { text } => {
                            if !text.is_empty() {
                                blocks.push(WireBlock::Text { text: text.clone() });
                            }
                        }
                        Content::ToolUse(call) if message.role == Role::Assistant => {
                            blocks.push(WireBlock::ToolUse {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                input: call.arguments.clone(),
                            });
                        }
                        Content::ToolUse(_) => {
                            return Err(AgentError::fatal(
                                "tool use content is only valid in assistant messages",
                            ));
                        }
                        Content::ToolResult(_) => {
                            return Err(AgentError::fatal(
                                "tool result content is only valid in tool messages",
                            ));
                        }
                    }
                }
                let role = if message.role == Role::User {
                    "user"
                } else {
                    "assistant"
                };
                wire.push(WireMessage {
                    role,
                    content: blocks,
                });
                last_was_tool = false;
            }
            Role::Tool => {
                let mut blocks = Vec::with_capacity(message.content.len());
                for content in &message.content {
                    match content {
                        Content::ToolResult(result) => blocks.push(WireBlock::ToolResult {
                            tool_use_id: result.call_id.clone(),
                            content: result.content.clone(),
                        }),
                        _ => {
                            return Err(AgentError::fatal(
                                "tool messages may only carry tool results",
                            ));
                        }
                    }
                }
                if last_was_tool {
                    if let Some(previous) = wire.last_mut() {
                        previous.content.extend(blocks);
                        continue;
                    }
                }
                wire.push(WireMessage {
                    role: "user",
                    content: blocks,
                });
                last_was_tool = true;
            }
        }
    }

    Ok(wire)
}

fn tools_to_wire(tools: &[ToolSchema]) -> Vec<WireTool<'_>> {
    tools
        .iter()
        .map(|tool| WireTool {
            name: &tool.name,
            description: &tool.description,
            input_schema: &tool.parameters,
        })
        .collect()
}

/// Normalize a Messages API response body
fn parse_response(raw: Value) -> Result<ProviderResponse> {
    let body: MessagesResponse = serde_json::from_value(raw.clone())
        .map_err(|e| AgentError::fatal(format!("malformed Anthropic response: {}", e)))?;

    let mut text: Option<String> = None;
    let mut tool_calls = Vec::new();

    for block in &body.content {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                let piece = block.get("text").and_then(Value::as_str).unwrap_or_default();
                text.get_or_insert_with(String::new).push_str(piece);
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str);
                let name = block.get("name").and_then(Value::as_str);
                let (Some(id), Some(name)) = (id, name) else {
                    return Err(AgentError::fatal("tool_use block missing id or name"));
                };
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                if !input.is_object() {
                    return Err(AgentError::fatal(format!(
                        "input for tool '{}' is not a JSON object",
                        name
                    )));
                }
                tool_calls.push(ToolCall::new(id, name, input));
            }
            other => {
                return Err(AgentError::fatal(format!(
                    "unexpected Anthropic content block type: {}",
                    other.unwrap_or("<missing>")
                )));
            }
        }
    }

    let usage = body
        .usage
        .map(|u| Usage::new(u.input_tokens, u.output_tokens))
        .unwrap_or_default();

    Ok(ProviderResponse {
        text,
        tool_calls,
        usage,
        raw,
    })
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ProviderResponse> {
        let send_tools = request.tool_choice.check(request.tools)?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system,
            messages: messages_to_wire(request.messages)?,
            tools: send_tools.then(|| tools_to_wire(request.tools)),
            tool_choice: send_tools.then(|| tool_choice_to_wire(request.tool_choice)),
            temperature: request.temperature,
        };

        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = request.tools.len(),
            "Sending Anthropic messages request"
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            .map_err(|e| AgentError::fatal(format!("malformed Anthropic response: {}", e)))?;
        parse_response(raw)
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
