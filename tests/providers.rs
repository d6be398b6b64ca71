//! HTTP provider integration tests
//!
//! Runs both backends against a local mock server.

mod common;

use basic_agent::core::{Message, ToolCall};
use basic_agent::llm::{
    AnthropicProvider, ChatRequest, OpenAiProvider, Provider, RetryPolicy, RetryingTransport,
    ToolChoice,
};
use basic_agent::AgentError;
use common::weather_schema;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn anthropic(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(
        "test-key",
        "claude-test",
        Url::parse(&server.uri()).unwrap(),
        reqwest::Client::new(),
    )
}

fn openai(server: &MockServer) -> OpenAiProvider {
    OpenAiProvider::new(
        "test-key",
        "gpt-test",
        Url::parse(&server.uri()).unwrap(),
        reqwest::Client::new(),
    )
}

async fn last_body(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    serde_json::from_slice(&requests.last().unwrap().body).unwrap()
}

#[tokio::test]
async fn test_anthropic_text_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-test",
            "max_tokens": 1024,
            "system": "Be brief.",
            "messages": [{"role": "user", "content": [{"type": "text", "text": "Hello"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hi there!"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let messages = vec![Message::user("Hello")];
    let response = anthropic(&server)
        .chat(&ChatRequest {
            messages: &messages,
            tools: &[],
            tool_choice: &ToolChoice::Auto,
            system: "Be brief.",
            max_tokens: 1024,
            temperature: None,
        })
        .await
        .unwrap();

    assert_eq!(response.text.as_deref(), Some("Hi there!"));
    assert_eq!(response.usage.input_tokens, 10);
    assert_eq!(response.usage.output_tokens, 5);
    assert!(!response.has_tool_calls());

    let body = last_body(&server).await;
    assert!(body.get("tools").is_none());
    assert!(body.get("tool_choice").is_none());
}

#[tokio::test]
async fn test_anthropic_tool_use_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({
            "tool_choice": {"type": "tool", "name": "get_weather"},
            "tools": [{"name": "get_weather", "description": "Get the weather for a city"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 8}
        })))
        .mount(&server)
        .await;

    let messages = vec![Message::user("Weather in Paris?")];
    let tools = vec![weather_schema()];
    let response = anthropic(&server)
        .chat(&ChatRequest {
            messages: &messages,
            tools: &tools,
            tool_choice: &ToolChoice::named("get_weather"),
            system: "",
            max_tokens: 512,
            temperature: Some(0.2),
        })
        .await
        .unwrap();

    assert_eq!(response.text.as_deref(), Some("Checking."));
    assert_eq!(
        response.tool_calls,
        vec![ToolCall::new("toolu_1", "get_weather", json!({"city": "Paris"}))]
    );

    let body = last_body(&server).await;
    assert!(body.get("system").is_none());
    assert_eq!(body["tools"][0]["input_schema"]["required"], json!(["city"]));
}

#[tokio::test]
async fn test_anthropic_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let messages = vec![Message::user("Hello")];
    let err = anthropic(&server)
        .chat(&ChatRequest {
            messages: &messages,
            tools: &[],
            tool_choice: &ToolChoice::Auto,
            system: "",
            max_tokens: 64,
            temperature: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Transient { status: Some(429), .. }));
}

#[tokio::test]
async fn test_anthropic_auth_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let messages = vec![Message::user("Hello")];
    let err = anthropic(&server)
        .chat(&ChatRequest {
            messages: &messages,
            tools: &[],
            tool_choice: &ToolChoice::Auto,
            system: "",
            max_tokens: 64,
            temperature: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Fatal(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_openai_text_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "max_tokens": 256,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi there!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let messages = vec![Message::user("Hello")];
    let response = openai(&server)
        .chat(&ChatRequest {
            messages: &messages,
            tools: &[],
            tool_choice: &ToolChoice::Auto,
            system: "Be brief.",
            max_tokens: 256,
            temperature: None,
        })
        .await
        .unwrap();

    assert_eq!(response.text.as_deref(), Some("Hi there!"));
    assert_eq!(response.usage.input_tokens, 10);
    assert_eq!(response.usage.output_tokens, 5);

    let body = last_body(&server).await;
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn test_openai_tool_calls_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "tool_choice": "required",
            "tools": [{"type": "function", "function": {"name": "get_weather"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "get_weather", "arguments": "{\"city\": \"London\"}"}},
                        {"id": "call_2", "type": "function",
                         "function": {"name": "get_weather", "arguments": "{\"city\": \"Paris\"}"}}
                    ]
                }
            }],
            "usage": {"prompt_tokens": 30, "completion_tokens": 12}
        })))
        .mount(&server)
        .await;

    let messages = vec![Message::user("Weather in London and Paris?")];
    let tools = vec![weather_schema()];
    let response = openai(&server)
        .chat(&ChatRequest {
            messages: &messages,
            tools: &tools,
            tool_choice: &ToolChoice::Required,
            system: "",
            max_tokens: 256,
            temperature: None,
        })
        .await
        .unwrap();

    assert_eq!(response.text, None);
    let names: Vec<&str> = response.tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(names, vec!["call_1", "call_2"]);
    assert_eq!(response.tool_calls[1].arguments, json!({"city": "Paris"}));
}

#[tokio::test]
async fn test_openai_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let messages = vec![Message::user("Hello")];
    let err = openai(&server)
        .chat(&ChatRequest {
            messages: &messages,
            tools: &[],
            tool_choice: &ToolChoice::Auto,
            system: "",
            max_tokens: 64,
            temperature: None,
        })
        .await
        .unwrap_err();

    assert!(err.is_transient());
}

#[tokio::test]
async fn test_retry_recovers_after_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Finally."}],
            "usage": {"input_tokens": 3, "output_tokens": 2}
        })))
        .mount(&server)
        .await;

    let transport = RetryingTransport::new(
        Arc::new(anthropic(&server)),
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            jitter: false,
        },
    );

    let messages = vec![Message::user("Hello")];
    let response = transport
        .send(
            &ChatRequest {
                messages: &messages,
                tools: &[],
                tool_choice: &ToolChoice::Auto,
                system: "",
                max_tokens: 64,
                temperature: None,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.text.as_deref(), Some("Finally."));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
