//! Provider trait for abstracting LLM backends
//!
//! The agent loop only sees normalized requests and responses; each backend
//! translates them to and from its own wire format.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, Message, Result, ToolCall, ToolSchema, Usage};

/// How the model may use the offered tools
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// Model decides
    #[default]
    Auto,
    /// Model must call some tool
    Any,
    /// Alias of `Any` for backends that use that word
    Required,
    /// Model must not call tools
    None,
    /// Model must call this exact tool
    Named(String),
}

impl ToolChoice {
    pub fn named(name: impl Into<String>) -> Self {
        ToolChoice::Named(name.into())
    }

    /// Check the choice against the offered tools.
    ///
    /// Returns whether `tools` and `tool_choice` go on the wire at all: with
    /// no tools, `Auto` and `None` are dropped and anything else is an error.
    pub fn check(&self, tools: &[ToolSchema]) -> Result<bool> {
        if tools.is_empty() {
            return match self {
                ToolChoice::Auto | ToolChoice::None => Ok(false),
                other => Err(AgentError::fatal(format!(
                    "tool_choice {:?} requires at least one tool",
                    other
                ))),
            };
        }
        if let ToolChoice::Named(name) = self {
            if !tools.iter().any(|t| &t.name == name) {
                return Err(AgentError::fatal(format!(
                    "tool_choice names unknown tool '{}'",
                    name
                )));
            }
        }
        Ok(true)
    }
}

/// One normalized chat request
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    /// Conversation so far, without the system prompt
    pub messages: &'a [Message],
    /// Tools the model may call
    pub tools: &'a [ToolSchema],
    pub tool_choice: &'a ToolChoice,
    /// Rendered system prompt
    pub system: &'a str,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

/// Normalized response from a provider
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    /// Concatenated text content, if the model produced any
    pub text: Option<String>,
    /// Tool calls in the order the model emitted them
    pub tool_calls: Vec<ToolCall>,
    /// Token usage for this call
    pub usage: Usage,
    /// Raw response body
    pub raw: Value,
}

impl ProviderResponse {
    /// Whether the model asked for any tools
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Trait for LLM providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one request and normalize the reply
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ProviderResponse>;

    /// Get the provider name
    fn name(&self) -> &str;

    /// Model this provider requests
    fn model(&self) -> &str;
}
