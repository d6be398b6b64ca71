//! Error types for the agent
//!
//! One error enum is shared by the provider layer, the loop and the memory hooks.

use thiserror::Error;

/// Main error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// Retryable backend fault (rate limit, server error, dropped connection)
    #[error("Transient provider error{}: {message}", status_suffix(.status))]
    Transient {
        /// HTTP status, when the fault came from a response
        status: Option<u16>,
        message: String,
    },

    /// Non-retryable backend fault (auth, malformed request or response)
    #[error("Fatal provider error: {0}")]
    Fatal(String),

    /// Tool executor failure. Turned into model-visible text, never returned from a run.
    #[error("{0}")]
    ToolExecution(String),

    /// System prompt references a variable the deps do not provide
    #[error("Template error: {0}")]
    Template(String),

    /// Structured output did not match the declared schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Iteration cap reached while the model was still requesting tools
    #[error("Max iterations ({max_iterations}) exceeded without a final answer")]
    MaxIterationsExceeded {
        max_iterations: usize,
        /// Text the model sent alongside its last tool calls, if any
        last_text: Option<String>,
    },

    /// Memory store errors
    #[error("Memory error: {0}")]
    Memory(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The run was cancelled from outside
    #[error("Run cancelled")]
    Cancelled,

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors that were not classified as transient
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Convenience Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Create a transient error
    pub fn transient(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Transient {
            status,
            message: msg.into(),
        }
    }

    /// Create a fatal provider error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a memory error
    pub fn memory(msg: impl Into<String>) -> Self {
        Self::Memory(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the retry wrapper may try again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a reqwest failure that happened before a status was received
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::transient(None, error.to_string())
        } else {
            Self::Http(error)
        }
    }

    /// Classify an HTTP error status. 429 and 5xx are retryable.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || (500..=599).contains(&status) {
            Self::transient(Some(status), body)
        } else {
            Self::fatal(format!("HTTP {}: {}", status, body))
        }
    }
}
