//! LLM Provider implementations and factory
//!
//! Submodules implement the concrete backends (Anthropic, OpenAI).

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use crate::core::config::{ProviderConfig, ProviderKind};
use crate::core::Result;
use crate::llm::traits::Provider;

pub use self::anthropic::AnthropicProvider;
pub use self::openai::OpenAiProvider;

/// Create a new LLM provider based on configuration
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config.kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(config)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_config(config)?),
    };
    Ok(provider)
}
