//! System prompt rendering
//!
//! Prompts are tera templates rendered against an optional `deps` value, so
//! `{{ deps.company }}` pulls a field from whatever the caller passed. Missing
//! variables are errors, never blanks.

use serde_json::Value;
use tera::{Context, Tera};

use crate::core::error::{AgentError, Result};

/// Render a prompt template against the caller's deps
pub fn render_prompt(template: &str, deps: Option<&Value>) -> Result<String> {
    let empty = Value::Object(Default::default());
    let mut context = Context::new();
    context.insert("deps", deps.unwrap_or(&empty));

    Tera::one_off(template, &context, false).map_err(|e| AgentError::template(describe(&e)))
}

/// Tera nests the useful message in the error source chain
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
