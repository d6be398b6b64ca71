//! basic-agent - LLM agent execution engine
//!
//! Drives an LLM through request/response turns, lets it call registered
//! tools in parallel, and can force it to return a schema-validated result.
//!
//! # Architecture
//!
//! - **Core**: Shared types, configuration, prompt rendering and error handling
//! - **LLM**: Provider abstraction, Anthropic and OpenAI backends, retrying transport
//! - **Tools**: Tool registry, parallel dispatcher and built-in tools
//! - **Agent**: The agent loop, structured output and persistent memory
//! - **CLI**: Command-line interface and REPL
//!
//! # Usage
//!
//! ```rust,no_run
//! use basic_agent::core::ToolSchema;
//! use basic_agent::Agent;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> basic_agent::Result<()> {
//!     let agent = Agent::builder()
//!         .system_prompt("You are a weather assistant.")
//!         .tool_fn(
//!             ToolSchema::new(
//!                 "get_weather",
//!                 "Get the weather for a city",
//!                 json!({
//!                     "type": "object",
//!                     "properties": {"city": {"type": "string"}},
//!                     "required": ["city"]
//!                 }),
//!             ),
//!             |args| Ok(format!("Sunny in {}", args["city"].as_str().unwrap_or("?"))),
//!         )
//!         .build()?;
//!
//!     let result = agent.run("What's the weather in Paris?").await?;
//!     println!("{}", result.output);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod llm;
pub mod tools;

// Re-export commonly used items
pub use agent::{Agent, AgentBuilder, RunOptions};
pub use cli::Repl;
pub use core::{AgentError, Config, Result, RunOutput, RunResult};
