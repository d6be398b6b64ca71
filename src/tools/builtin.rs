//! Built-in tools shipped with the binary

use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{AgentError, Result, ToolSchema};
use crate::tools::registry::ToolRegistry;

/// Schema of the `current_time` tool
pub fn current_time_schema() -> ToolSchema {
    ToolSchema::new(
        "current_time",
        "Get the current time as Unix epoch seconds (UTC)",
        json!({
            "type": "object",
            "properties": {}
        }),
    )
}

fn current_time(_arguments: &Value) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AgentError::tool(format!("system clock is before the epoch: {}", e)))?;
    Ok(now.as_secs().to_string())
}

/// Register every built-in tool
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<()> {
    registry.register_fn(current_time_schema(), current_time)
}
