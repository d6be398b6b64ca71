//! Structured output integration tests

mod common;

use basic_agent::agent::StructuredOutputSpec;
use basic_agent::core::Role;
use basic_agent::llm::ToolChoice;
use basic_agent::{Agent, AgentError, RunOutput};
use common::*;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct Sentiment {
    sentiment: String,
    confidence: f64,
}

#[tokio::test]
async fn test_forced_structured_result_on_first_call() {
    let provider = ScriptedProvider::new(vec![tools(
        None,
        vec![call(
            "s1",
            "Sentiment",
            json!({"sentiment": "positive", "confidence": 0.92}),
        )],
        12,
        6,
    )]);
    let agent = Agent::builder()
        .provider(provider.clone())
        .output_schema("Sentiment", sentiment_schema())
        .build()
        .unwrap();

    let result = agent.run("I love this product!").await.unwrap();

    let parsed: Sentiment = result.output.parse().unwrap();
    assert_eq!(
        parsed,
        Sentiment {
            sentiment: "positive".to_string(),
            confidence: 0.92
        }
    );
    assert_eq!(result.provider_calls, 1);

    let first = &provider.requests()[0];
    assert_eq!(first.tool_choice, ToolChoice::named("Sentiment"));
    assert_eq!(first.tools, vec!["Sentiment"]);
}

#[tokio::test]
async fn test_plain_text_gets_nudged_then_choice_relaxes() {
    let provider = ScriptedProvider::new(vec![
        text("It sounds positive.", 5, 5),
        tools(
            None,
            vec![call(
                "s1",
                "Sentiment",
                json!({"sentiment": "positive", "confidence": 0.8}),
            )],
            5,
            5,
        ),
    ]);
    let agent = Agent::builder()
        .provider(provider.clone())
        .output_schema("Sentiment", sentiment_schema())
        .build()
        .unwrap();

    let result = agent.run("Great service").await.unwrap();
    assert!(result.output.as_structured().is_some());
    assert_eq!(result.provider_calls, 2);

    let requests = provider.requests();
    assert_eq!(requests[0].tool_choice, ToolChoice::named("Sentiment"));
    assert_eq!(requests[1].tool_choice, ToolChoice::Auto);

    let history = &requests[1].messages;
    assert_eq!(history.len(), 3);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[2].role, Role::User);
    assert!(history[2].text().contains("'Sentiment'"));
}

#[tokio::test]
async fn test_plain_text_accepted_on_last_iteration() {
    let provider = ScriptedProvider::new(vec![text("Just text.", 1, 1)]);
    let agent = Agent::builder()
        .provider(provider.clone())
        .output_schema("Sentiment", sentiment_schema())
        .max_iterations(1)
        .build()
        .unwrap();

    let result = agent.run("hmm").await.unwrap();
    assert_eq!(result.output, RunOutput::Text("Just text.".to_string()));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_invalid_structured_arguments_fail_validation() {
    let provider = ScriptedProvider::new(vec![tools(
        None,
        vec![call(
            "s1",
            "Sentiment",
            json!({"sentiment": "ecstatic", "confidence": 0.5}),
        )],
        1,
        1,
    )]);
    let agent = Agent::builder()
        .provider(provider)
        .output_schema("Sentiment", sentiment_schema())
        .build()
        .unwrap();

    let err = agent.run("wow").await.unwrap_err();
    assert!(matches!(err, AgentError::Validation(_)));
}

#[tokio::test]
async fn test_structured_call_wins_over_sibling_tools() {
    let executed = Arc::new(AtomicUsize::new(0));
    let counter = executed.clone();

    let provider = ScriptedProvider::new(vec![tools(
        None,
        vec![
            call("w1", "get_weather", json!({"city": "Paris"})),
            call(
                "s1",
                "Sentiment",
                json!({"sentiment": "neutral", "confidence": 0.5}),
            ),
        ],
        1,
        1,
    )]);
    let agent = Agent::builder()
        .provider(provider.clone())
        .tool_fn(weather_schema(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("Rainy".to_string())
        })
        .output_schema("Sentiment", sentiment_schema())
        .build()
        .unwrap();

    let result = agent.run("How is Paris?").await.unwrap();

    assert_eq!(
        result.output.as_structured(),
        Some(&json!({"sentiment": "neutral", "confidence": 0.5}))
    );
    assert_eq!(executed.load(Ordering::SeqCst), 0);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_tools_run_before_structured_result() {
    let provider = ScriptedProvider::new(vec![
        tools(
            None,
            vec![call("w1", "get_weather", json!({"city": "Paris"}))],
            3,
            2,
        ),
        tools(
            None,
            vec![call(
                "s1",
                "Sentiment",
                json!({"sentiment": "negative", "confidence": 0.7}),
            )],
            4,
            3,
        ),
    ]);
    let agent = Agent::builder()
        .provider(provider.clone())
        .tool_fn(weather_schema(), |_| Ok("Rainy".to_string()))
        .output_schema("Sentiment", sentiment_schema())
        .build()
        .unwrap();

    let result = agent.run("Is Paris weather depressing?").await.unwrap();
    assert!(result.output.as_structured().is_some());
    assert_eq!(result.usage.total(), 12);

    let requests = provider.requests();
    assert_eq!(requests[0].tools, vec!["get_weather", "Sentiment"]);
    assert_eq!(requests[1].tool_choice, ToolChoice::Auto);
    assert_eq!(tool_result_contents(&requests[1].messages[2]), vec!["Rainy"]);
}

#[tokio::test]
async fn test_structured_name_colliding_with_tool_is_rejected() {
    let err = Agent::builder()
        .provider(ScriptedProvider::new(vec![]))
        .tool_fn(weather_schema(), |_| Ok(String::new()))
        .structured_output(StructuredOutputSpec::new("get_weather", sentiment_schema()))
        .build()
        .unwrap_err();

    assert!(matches!(err, AgentError::Config(_)));
}

#[tokio::test]
async fn test_text_output_cannot_parse_as_structured() {
    let provider = ScriptedProvider::new(vec![text("plain", 1, 1)]);
    let agent = Agent::builder().provider(provider).build().unwrap();

    let result = agent.run("hi").await.unwrap();
    assert!(result.output.parse::<Sentiment>().is_err());
}
