//! Parallel tool dispatch
//!
//! Fans a turn's tool calls out to spawned tasks, bounded by a semaphore,
//! and hands the results back in call order.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::{AgentError, Result, ToolCall, ToolResult};
use crate::tools::registry::ToolRegistry;

/// Default number of tools allowed to run at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Bounded fan-out/fan-in executor for tool calls
#[derive(Clone)]
pub struct ParallelDispatcher {
    registry: Arc<ToolRegistry>,
    max_concurrency: usize,
    tool_timeout: Option<Duration>,
}

impl ParallelDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            tool_timeout: None,
        }
    }

    /// Limit concurrent executions (at least one)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Give each call a deadline
    pub fn with_tool_timeout(mut self, tool_timeout: Option<Duration>) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute all calls and return one result per call, in call order.
    ///
    /// A failing, slow or panicking tool only affects its own result. Only
    /// cancellation aborts the batch.
    pub async fn dispatch(
        &self,
        calls: &[ToolCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<ToolResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set: JoinSet<(usize, String)> = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            let registry = self.registry.clone();
            let semaphore = semaphore.clone();
            let name = call.name.clone();
            let arguments = call.arguments.clone();
            let tool_timeout = self.tool_timeout;

            debug!(tool = %name, call_id = %call.id, "Dispatching tool call");

            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, format!("Error executing tool '{}': dispatcher closed", name));
                };

                let run = AssertUnwindSafe(registry.execute(&name, &arguments)).catch_unwind();
                let content = match tool_timeout {
                    Some(limit) => match timeout(limit, run).await {
                        Ok(outcome) => settle(&name, outcome),
                        Err(_) => format!(
                            "Error executing tool '{}': timed out after {}s",
                            name,
                            limit.as_secs_f64()
                        ),
                    },
                    None => settle(&name, run.await),
                };
                (index, content)
            });
        }

        let mut slots: Vec<Option<String>> = vec![None; calls.len()];
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return Err(AgentError::Cancelled);
                }
                next = set.join_next() => match next {
                    Some(Ok((index, content))) => slots[index] = Some(content),
                    Some(Err(e)) => {
                        debug!(error = %e, "Tool task did not complete");
                        set.abort_all();
                        return Err(AgentError::Cancelled);
                    }
                    None => break,
                },
            }
        }

        Ok(calls
            .iter()
            .zip(slots)
            .map(|(call, content)| {
                let content = content.unwrap_or_else(|| {
                    format!("Error executing tool '{}': no result", call.name)
                });
                debug!(tool = %call.name, call_id = %call.id, bytes = content.len(), "Tool result");
                ToolResult::new(call.id.clone(), content)
            })
            .collect())
    }
}

/// Turn a caught panic into the tool's error text
fn settle(name: &str, outcome: std::result::Result<String, Box<dyn Any + Send>>) -> String {
    match outcome {
        Ok(content) => content,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "tool panicked".to_string());
            format!("Error executing tool '{}': {}", name, message)
        }
    }
}
