//! Configuration management
//!
//! Supports environment variables, config files, and runtime overrides.
//! Priority: CLI args > env vars > config file > defaults. The file is
//! parsed first, env vars are applied over it, and the CLI applies its own
//! flags over the result.
//!
//! Config file location: ~/.config/basic-agent/config.toml

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::core::error::{AgentError, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend selection and transport settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Loop behavior
    #[serde(default)]
    pub agent: AgentConfig,
    /// Retry policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,
    /// Tool dispatch limits
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Persistent memory settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// The closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Chat Completions API
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
}

impl ProviderKind {
    /// Model used when the caller does not override it
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "claude-haiku-4-5-20251001",
            ProviderKind::OpenAi => "gpt-5.2",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(AgentError::config(format!(
                "Unknown provider '{}'. Use 'anthropic' or 'openai'.",
                other
            ))),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which backend to talk to
    pub kind: ProviderKind,
    /// Model name override
    pub model: Option<String>,
    /// Base URL of the Anthropic API
    pub anthropic_base_url: String,
    /// Base URL of the OpenAI API
    pub openai_base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,
    /// Token cap per provider call
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum provider calls per run
    /// Default: 10
    pub max_iterations: usize,
    /// Whether to log at debug level
    pub debug: bool,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per provider call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each time
    pub base_delay_ms: u64,
    /// Add up to one second of random jitter to each delay
    pub jitter: bool,
}

/// Tool dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Concurrent tool executions per turn
    pub max_concurrency: usize,
    /// Per-call timeout for a tool, in seconds
    pub tool_timeout_secs: Option<u64>,
}

/// Persistent memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Scope for stored memory items
    pub agent_id: String,
    /// JSON file backing the store. None keeps memory in process.
    pub path: Option<PathBuf>,
    /// Name of the memory schema, also the update tool's name
    pub schema_name: String,
    /// JSON Schema for memory items. None uses a list of remembered facts.
    pub schema: Option<Value>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Anthropic,
            model: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            openai_base_url: "https://api.openai.com".to_string(),
            timeout_secs: 600,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            max_tokens: 4096,
            temperature: None,
            max_iterations: 10,
            debug: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            jitter: false,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            tool_timeout_secs: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            agent_id: "basic-agent".to_string(),
            path: None,
            schema_name: "UserNotes".to_string(),
            schema: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("basic-agent")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from defaults, the config file and the environment.
    ///
    /// A missing file means defaults; a file that exists but does not parse
    /// or validate is an error.
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::load_layered(&Self::config_file(), |key| env::var(key).ok())
    }

    fn load_layered(path: &Path, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if path.exists() {
            Self::parse_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_with(var)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a specific file, without env overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AgentError::config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content).map_err(|e| {
            AgentError::config(format!("Invalid config file {}: {}", path.display(), e))
        })
    }

    fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(kind) = var("BASIC_AGENT_PROVIDER") {
            self.provider.kind = kind.parse()?;
        }
        if let Some(model) = var("BASIC_AGENT_MODEL") {
            self.provider.model = Some(model);
        }
        if let Some(url) = var("ANTHROPIC_BASE_URL") {
            self.provider.anthropic_base_url = url;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.provider.openai_base_url = url;
        }
        if let Some(debug) = var("BASIC_AGENT_DEBUG") {
            self.agent.debug = debug == "true" || debug == "1";
        }
        if let Some(agent_id) = var("BASIC_AGENT_ID") {
            self.memory.agent_id = agent_id;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| AgentError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AgentError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| AgentError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Reject settings the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        self.provider.base_url()?;
        if self.agent.max_iterations == 0 {
            return Err(AgentError::config("agent.max_iterations must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(AgentError::config("retry.max_attempts must be at least 1"));
        }
        if self.dispatch.max_concurrency == 0 {
            return Err(AgentError::config("dispatch.max_concurrency must be at least 1"));
        }
        if self.memory.schema_name.trim().is_empty() {
            return Err(AgentError::config("memory.schema_name must not be empty"));
        }
        Ok(())
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

impl ProviderConfig {
    /// Model to request, falling back to the backend default
    pub fn model_name(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.kind.default_model().to_string())
    }

    /// Parsed base URL of the selected backend
    pub fn base_url(&self) -> Result<Url> {
        let raw = match self.kind {
            ProviderKind::Anthropic => &self.anthropic_base_url,
            ProviderKind::OpenAi => &self.openai_base_url,
        };
        Url::parse(raw)
            .map_err(|e| AgentError::config(format!("Invalid base URL '{}': {}", raw, e)))
    }

    /// Read the API key for the selected backend from the environment
    pub fn api_key(&self) -> Result<String> {
        let var = self.kind.api_key_env();
        env::var(var)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AgentError::config(format!("{} is not set", var)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl DispatchConfig {
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}
