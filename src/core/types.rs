//! Shared types used across the agent modules
//!
//! Contains message structures, tool definitions, token usage and run results.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::{AgentError, Result};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Results of tool calls, sent back to the model
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One piece of message content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    ToolUse(ToolCall),
    ToolResult(ToolResult),
}

impl Content {
    /// Create a text content block
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    /// Get the text if this is a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Get the tool call if this is a tool use block
    pub fn as_tool_use(&self) -> Option<&ToolCall> {
        match self {
            Content::ToolUse(call) => Some(call),
            _ => None,
        }
    }

    /// Get the tool result if this is a tool result block
    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            Content::ToolResult(result) => Some(result),
            _ => None,
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Ordered content blocks
    pub content: Vec<Content>,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![Content::text(content)],
        }
    }

    /// Create a new assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![Content::text(content)],
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![Content::text(content)],
        }
    }

    /// Create an assistant turn carrying optional text and the requested tool calls
    pub fn assistant_tool_use(text: Option<&str>, calls: &[ToolCall]) -> Self {
        let mut content = Vec::with_capacity(calls.len() + 1);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            content.push(Content::text(text));
        }
        content.extend(calls.iter().cloned().map(Content::ToolUse));
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Create a tool turn from results, in the order given
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::Tool,
            content: results.into_iter().map(Content::ToolResult).collect(),
        }
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Tool calls carried by this message
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content.iter().filter_map(Content::as_tool_use).collect()
    }
}

/// A tool call made by the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-issued identifier, opaque to the agent
    pub id: String,
    /// Name of the tool to invoke
    pub name: String,
    /// JSON object of arguments
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result of executing one tool call, as shown to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the tool call this answers
    pub call_id: String,
    /// Output text, or an error description
    pub content: String,
}

impl ToolResult {
    pub fn new(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
        }
    }
}

/// Provider-agnostic description of a callable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Name of the function, unique within a registry
    pub name: String,
    /// Description of what the function does
    pub description: String,
    /// JSON Schema for the parameters
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    /// Create a new tool schema
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Token usage, summed across provider calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Add another call's usage to this total
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Final output of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// Plain text answer
    Text(String),
    /// Arguments of the structured-output tool, validated against its schema
    Structured(serde_json::Value),
}

impl RunOutput {
    /// Get the text if the run ended with a plain answer
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RunOutput::Text(text) => Some(text),
            RunOutput::Structured(_) => None,
        }
    }

    /// Get the structured value if the run ended with one
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            RunOutput::Structured(value) => Some(value),
            RunOutput::Text(_) => None,
        }
    }

    /// Deserialize a structured result into a caller type
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            RunOutput::Structured(value) => serde_json::from_value(value.clone())
                .map_err(|e| AgentError::validation(e.to_string())),
            RunOutput::Text(_) => Err(AgentError::validation(
                "run produced plain text, not a structured result",
            )),
        }
    }
}

impl std::fmt::Display for RunOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutput::Text(text) => write!(f, "{}", text),
            RunOutput::Structured(value) => write!(f, "{}", value),
        }
    }
}

/// Everything a caller gets back from one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub output: RunOutput,
    /// Cumulative usage over every provider call in the run
    pub usage: Usage,
    /// Completed provider calls; a retried call counts once
    pub provider_calls: usize,
}
