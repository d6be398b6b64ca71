//! Core module - shared infrastructure for the agent
//!
//! This module contains foundational types, configuration, error handling
//! and prompt rendering used throughout the crate.

pub mod config;
pub mod error;
pub mod template;
pub mod types;

pub use config::Config;
pub use error::{AgentError, Result};
pub use template::render_prompt;
pub use types::*;
