//! Tool registry - manages and dispatches tool calls
//!
//! Central hub for registering tools and routing tool calls to executors.
//! Execution never fails from the caller's point of view: unknown tools and
//! executor errors come back as text for the model to read.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::{AgentError, Result, ToolSchema};

/// Something the model can call
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run the tool with the model's arguments
    async fn execute(&self, arguments: &Value) -> Result<String>;
}

/// Adapter for synchronous closures, run on the blocking pool so they
/// neither stall the runtime nor escape the dispatcher's timeout
struct FnTool<F>(Arc<F>);

#[async_trait]
impl<F> ToolExecutor for FnTool<F>
where
    F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
{
    async fn execute(&self, arguments: &Value) -> Result<String> {
        let f = self.0.clone();
        let arguments = arguments.clone();
        match tokio::task::spawn_blocking(move || f(&arguments)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(AgentError::tool(e.to_string())),
        }
    }
}

/// Adapter for closures returning a boxed future
struct AsyncFnTool<F>(F);

#[async_trait]
impl<F> ToolExecutor for AsyncFnTool<F>
where
    F: Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync,
{
    async fn execute(&self, arguments: &Value) -> Result<String> {
        (self.0)(arguments.clone()).await
    }
}

struct RegisteredTool {
    schema: ToolSchema,
    executor: Arc<dyn ToolExecutor>,
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    /// Tools in registration order
    tools: Vec<RegisteredTool>,
    /// Position of each tool by name
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, schema: ToolSchema, executor: Arc<dyn ToolExecutor>) -> Result<()> {
        if self.index.contains_key(&schema.name) {
            return Err(AgentError::config(format!(
                "Tool '{}' is already registered",
                schema.name
            )));
        }
        self.index.insert(schema.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { schema, executor });
        Ok(())
    }

    /// Register a synchronous function as a tool
    pub fn register_fn<F>(&mut self, schema: ToolSchema, f: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
    {
        self.register(schema, Arc::new(FnTool(Arc::new(f))))
    }

    /// Register an async function as a tool
    pub fn register_async<F>(&mut self, schema: ToolSchema, f: F) -> Result<()>
    where
        F: Fn(Value) -> BoxFuture<'static, Result<String>> + Send + Sync + 'static,
    {
        self.register(schema, Arc::new(AsyncFnTool(f)))
    }

    /// Get a tool's schema by name
    pub fn lookup(&self, name: &str) -> Option<&ToolSchema> {
        self.index.get(name).map(|&i| &self.tools[i].schema)
    }

    /// All schemas, in registration order
    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    /// Tool names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.schema.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call, capturing any failure as text
    pub async fn execute(&self, name: &str, arguments: &Value) -> String {
        let Some(&i) = self.index.get(name) else {
            debug!(tool = %name, "Unknown tool requested");
            return format!("Error: Unknown tool '{}'", name);
        };

        match self.tools[i].executor.execute(arguments).await {
            Ok(output) => output,
            Err(e) => {
                debug!(tool = %name, error = %e, "Tool execution failed");
                format!("Error executing tool '{}': {}", name, e)
            }
        }
    }
}
