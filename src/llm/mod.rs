//! LLM module - Language Model integrations
//!
//! Provides the provider abstraction, the Anthropic and OpenAI backends and
//! the retrying transport every agent call goes through.

pub mod provider;
pub mod retry;
pub mod traits;

pub use provider::{create_provider, AnthropicProvider, OpenAiProvider};
pub use retry::{RetryPolicy, RetryingTransport};
pub use traits::{ChatRequest, Provider, ProviderResponse, ToolChoice};
