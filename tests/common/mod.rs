//! Shared helpers for integration tests: scripted providers and responses.

#![allow(dead_code)]

use async_trait::async_trait;
use basic_agent::core::{AgentError, Message, Result, ToolCall, ToolSchema, Usage};
use basic_agent::llm::{ChatRequest, Provider, ProviderResponse, ToolChoice};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a provider saw on one call
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub tool_choice: ToolChoice,
    pub system: String,
}

/// Provider that replays a fixed script and records every request
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, request: &ChatRequest<'_>) -> Result<ProviderResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice: request.tool_choice.clone(),
            system: request.system.to_string(),
        });
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::fatal("script exhausted")))
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

/// Provider that never answers within a test's lifetime
pub struct StallingProvider;

#[async_trait]
impl Provider for StallingProvider {
    async fn chat(&self, _request: &ChatRequest<'_>) -> Result<ProviderResponse> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(ProviderResponse::default())
    }

    fn name(&self) -> &str {
        "stalling"
    }

    fn model(&self) -> &str {
        "stalling-model"
    }
}

pub fn text(text: &str, input_tokens: u64, output_tokens: u64) -> Result<ProviderResponse> {
    Ok(ProviderResponse {
        text: Some(text.to_string()),
        tool_calls: Vec::new(),
        usage: Usage::new(input_tokens, output_tokens),
        raw: Value::Null,
    })
}

pub fn tools(
    text: Option<&str>,
    calls: Vec<ToolCall>,
    input_tokens: u64,
    output_tokens: u64,
) -> Result<ProviderResponse> {
    Ok(ProviderResponse {
        text: text.map(str::to_string),
        tool_calls: calls,
        usage: Usage::new(input_tokens, output_tokens),
        raw: Value::Null,
    })
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

pub fn transient(status: u16) -> Result<ProviderResponse> {
    Err(AgentError::transient(Some(status), "try again"))
}

pub fn weather_schema() -> ToolSchema {
    ToolSchema::new(
        "get_weather",
        "Get the weather for a city",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
    )
}

pub fn sentiment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sentiment": {"type": "string", "enum": ["positive", "negative", "neutral"]},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
        },
        "required": ["sentiment", "confidence"]
    })
}

/// Every tool result content in a message, in order
pub fn tool_result_contents(message: &Message) -> Vec<String> {
    message
        .content
        .iter()
        .filter_map(|c| c.as_tool_result())
        .map(|r| r.content.clone())
        .collect()
}
