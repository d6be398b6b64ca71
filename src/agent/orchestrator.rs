//! Agent orchestrator
//!
//! Main agent that coordinates the provider, the tools and the conversation.
//! Each run sends the history to the model, executes any tools it asks for,
//! feeds the results back and repeats until the model answers, returns a
//! structured result, or the iteration cap is hit.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::agent::conversation::Conversation;
use crate::agent::loop_state::{AgentLoopState, LoopPhase};
use crate::agent::memory::{with_memory_block, Memory};
use crate::agent::structured::{StructuredOutputBroker, StructuredOutputSpec};
use crate::core::config::{Config, ProviderConfig, ProviderKind};
use crate::core::{
    render_prompt, AgentError, Result, RunOutput, RunResult, ToolSchema,
};
use crate::llm::{create_provider, ChatRequest, Provider, RetryPolicy, RetryingTransport, ToolChoice};
use crate::tools::{ParallelDispatcher, ToolExecutor, ToolRegistry};

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Tool result given to calls that were skipped because a structured result won
const SKIPPED_CALL: &str = "Not executed: the structured result was already produced.";

/// Per-run inputs
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Values available to the system template as `deps`
    pub deps: Option<Value>,
    /// Memory item to load before the run and update after it
    pub memory_id: Option<String>,
    /// Whether to ask the model for a memory update after the run
    pub memory_update: bool,
    /// Cancels the run from outside
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            deps: None,
            memory_id: None,
            memory_update: true,
            cancel: CancellationToken::new(),
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deps(mut self, deps: Value) -> Self {
        self.deps = Some(deps);
        self
    }

    pub fn memory_id(mut self, id: impl Into<String>) -> Self {
        self.memory_id = Some(id.into());
        self
    }

    pub fn memory_update(mut self, enabled: bool) -> Self {
        self.memory_update = enabled;
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// Main agent that orchestrates LLM and tools
pub struct Agent {
    /// Every provider call goes through here
    transport: RetryingTransport,
    /// Tool execution (shares the registry with spawned tasks)
    dispatcher: ParallelDispatcher,
    /// Unrendered system prompt
    system_template: String,
    structured: Option<StructuredOutputBroker>,
    memory: Option<Memory>,
    max_tokens: u32,
    temperature: Option<f32>,
    max_iterations: usize,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Start configuring an agent
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Run the agent with a user message
    pub async fn run(&self, message: &str) -> Result<RunResult> {
        self.run_with(message, RunOptions::default()).await
    }

    /// Run the agent with deps, memory and cancellation options
    pub async fn run_with(&self, message: &str, options: RunOptions) -> Result<RunResult> {
        let span = info_span!(
            "agent.run",
            provider = self.transport.name(),
            model = self.transport.model(),
            max_iterations = self.max_iterations,
        );
        self.execute(message, options).instrument(span).await
    }

    async fn execute(&self, message: &str, options: RunOptions) -> Result<RunResult> {
        // Caller mistakes fail before any network cost
        let memory_target = match (&options.memory_id, &self.memory) {
            (Some(_), None) => {
                return Err(AgentError::config(
                    "memory_id was given but the agent has no memory configured",
                ))
            }
            (Some(id), Some(memory)) => Some((memory, id.as_str())),
            (None, _) => None,
        };

        let rendered = render_prompt(&self.system_template, options.deps.as_ref())?;
        let system = match memory_target {
            Some((memory, id)) => match memory.get(id).await? {
                Some(item) => {
                    debug!(memory_id = %id, "Loaded memory into system prompt");
                    with_memory_block(&rendered, &item)?
                }
                None => rendered,
            },
            None => rendered,
        };

        info!(message_len = message.len(), "Starting agent run");

        let mut conversation = Conversation::new(system);
        conversation.add_user(message);

        let mut tools = self.dispatcher.registry().list_schemas();
        let initial_choice = match &self.structured {
            Some(broker) => {
                tools.push(broker.tool_schema());
                broker.initial_choice()
            }
            None => ToolChoice::Auto,
        };

        let mut state = AgentLoopState::new(self.max_iterations, initial_choice);
        let result = self
            .run_loop(&mut conversation, &tools, &mut state, &options.cancel)
            .await;

        let output = match result {
            Ok(output) => {
                state.enter(LoopPhase::Done);
                output
            }
            Err(e) => {
                state.enter(LoopPhase::Failed);
                warn!(error = %e, iterations = state.iteration, "Agent run failed");
                return Err(e);
            }
        };

        if let Some((memory, id)) = memory_target {
            if options.memory_update {
                let update = self
                    .update_memory(memory, id, &mut conversation, &output, &mut state, &options.cancel)
                    .await;
                match update {
                    Ok(()) => {}
                    Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                    Err(e) => {
                        warn!(memory_id = %id, error = %e, "Memory update failed, keeping run output");
                    }
                }
            }
        }

        info!(
            provider_calls = state.provider_calls,
            input_tokens = state.usage.input_tokens,
            output_tokens = state.usage.output_tokens,
            "Agent run finished"
        );

        Ok(RunResult {
            output,
            usage: state.usage,
            provider_calls: state.provider_calls,
        })
    }

    /// The request/dispatch loop
    async fn run_loop(
        &self,
        conversation: &mut Conversation,
        tools: &[ToolSchema],
        state: &mut AgentLoopState,
        cancel: &CancellationToken,
    ) -> Result<RunOutput> {
        while state.should_continue() {
            let pending = conversation.pending_call_ids();
            if !pending.is_empty() {
                return Err(AgentError::fatal(format!(
                    "tool calls without results: {}",
                    pending.join(", ")
                )));
            }

            state.enter(LoopPhase::AwaitingResponse);
            let request = ChatRequest {
                messages: conversation.messages(),
                tools,
                tool_choice: &state.tool_choice,
                system: conversation.system_prompt(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };
            let response = self.transport.send(&request, cancel).await?;
            state.record_response(&response);

            debug!(
                iteration = state.iteration,
                tool_calls = response.tool_calls.len(),
                input_tokens = response.usage.input_tokens,
                output_tokens = response.usage.output_tokens,
                "Provider responded"
            );

            // No tool calls: the text is the answer
            if !response.has_tool_calls() {
                let text = response.text.unwrap_or_default();

                if let Some(broker) = &self.structured {
                    if !state.is_last_iteration() {
                        debug!(tool = broker.tool_name(), "Plain text instead of structured result, nudging");
                        if !text.is_empty() {
                            conversation.add_assistant(text);
                        }
                        conversation.add_user(format!(
                            "Respond by calling the '{}' tool with your final answer.",
                            broker.tool_name()
                        ));
                        state.relax_tool_choice();
                        continue;
                    }
                }

                return Ok(RunOutput::Text(text));
            }

            conversation.add_tool_use(response.text.as_deref(), &response.tool_calls);
            for call in &response.tool_calls {
                debug!(tool = %call.name, call_id = %call.id, "Tool call requested");
            }

            // A structured result ends the run; sibling calls are not executed
            if let Some(broker) = &self.structured {
                if let Some(call) = broker.find_result_call(&response.tool_calls) {
                    let value = broker.validate(&call.arguments)?;
                    return Ok(RunOutput::Structured(value));
                }
            }

            state.enter(LoopPhase::Dispatching);
            let results = self.dispatcher.dispatch(&response.tool_calls, cancel).await?;
            conversation.add_tool_results(results);

            // After processing tool calls, stop forcing a specific tool
            state.relax_tool_choice();
        }

        Err(AgentError::MaxIterationsExceeded {
            max_iterations: self.max_iterations,
            last_text: state.last_text.clone(),
        })
    }

    /// Ask the model to rewrite the memory item from the finished conversation
    async fn update_memory(
        &self,
        memory: &Memory,
        id: &str,
        conversation: &mut Conversation,
        output: &RunOutput,
        state: &mut AgentLoopState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pending = conversation.pending_call_ids();
        if !pending.is_empty() {
            conversation.add_tool_results(
                pending
                    .into_iter()
                    .map(|call_id| crate::core::ToolResult::new(call_id, SKIPPED_CALL))
                    .collect(),
            );
        }
        if let RunOutput::Text(text) = output {
            if !text.is_empty() {
                conversation.add_assistant(text.clone());
            }
        }
        conversation.add_user(memory.update_prompt());

        let tools = [memory.tool_schema()];
        let choice = ToolChoice::Named(memory.schema_name().to_string());
        let request = ChatRequest {
            messages: conversation.messages(),
            tools: &tools,
            tool_choice: &choice,
            system: conversation.system_prompt(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.transport.send(&request, cancel).await?;
        state.record_call(&response);

        let Some(call) = response
            .tool_calls
            .iter()
            .find(|call| call.name == memory.schema_name())
        else {
            warn!(memory_id = %id, "Model did not call the memory tool, skipping update");
            return Ok(());
        };

        match memory.put(id, call.arguments.clone()).await {
            Ok(()) => {
                info!(memory_id = %id, "Memory updated");
                Ok(())
            }
            Err(AgentError::Memory(reason)) => {
                warn!(memory_id = %id, %reason, "Memory update rejected, keeping previous item");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Registered tools, without the structured-output tool
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn provider_name(&self) -> &str {
        self.transport.name()
    }

    pub fn model(&self) -> &str {
        self.transport.model()
    }

    pub fn system_template(&self) -> &str {
        &self.system_template
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn structured_output(&self) -> Option<&StructuredOutputSpec> {
        self.structured.as_ref().map(|b| b.spec())
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.memory.as_ref()
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    provider: Option<Arc<dyn Provider>>,
    provider_config: ProviderConfig,
    system_template: String,
    registry: ToolRegistry,
    registration_error: Option<AgentError>,
    structured: Option<StructuredOutputSpec>,
    memory: Option<Memory>,
    max_tokens: u32,
    temperature: Option<f32>,
    max_iterations: usize,
    retry: RetryPolicy,
    max_concurrency: usize,
    tool_timeout: Option<Duration>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self {
            provider: None,
            provider_config: ProviderConfig::default(),
            system_template: DEFAULT_SYSTEM_PROMPT.to_string(),
            registry: ToolRegistry::new(),
            registration_error: None,
            structured: None,
            memory: None,
            max_tokens: 4096,
            temperature: None,
            max_iterations: 10,
            retry: RetryPolicy::default(),
            max_concurrency: crate::tools::dispatcher::DEFAULT_MAX_CONCURRENCY,
            tool_timeout: None,
        }
    }
}

impl AgentBuilder {
    /// Apply every setting from a loaded configuration
    pub fn config(mut self, config: &Config) -> Self {
        self.provider_config = config.provider.clone();
        self.system_template = config.agent.system_prompt.clone();
        self.max_tokens = config.agent.max_tokens;
        self.temperature = config.agent.temperature;
        self.max_iterations = config.agent.max_iterations;
        self.retry = RetryPolicy::from(&config.retry);
        self.max_concurrency = config.dispatch.max_concurrency;
        self.tool_timeout = config.dispatch.tool_timeout();
        if self.memory.is_none() {
            self.memory = Some(Memory::from_config(&config.memory));
        }
        self
    }

    /// Use an already constructed provider
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Pick the backend to construct at build time
    pub fn provider_kind(mut self, kind: ProviderKind) -> Self {
        self.provider_config.kind = kind;
        self
    }

    /// Override the backend's default model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.provider_config.model = Some(model.into());
        self
    }

    /// System prompt template, rendered per run against `deps`
    pub fn system_prompt(mut self, template: impl Into<String>) -> Self {
        self.system_template = template.into();
        self
    }

    /// Use a prepared registry, replacing any tools added so far
    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a tool
    pub fn tool(mut self, schema: ToolSchema, executor: Arc<dyn ToolExecutor>) -> Self {
        if let Err(e) = self.registry.register(schema, executor) {
            self.registration_error.get_or_insert(e);
        }
        self
    }

    /// Add a synchronous function as a tool
    pub fn tool_fn<F>(mut self, schema: ToolSchema, f: F) -> Self
    where
        F: Fn(&Value) -> Result<String> + Send + Sync + 'static,
    {
        if let Err(e) = self.registry.register_fn(schema, f) {
            self.registration_error.get_or_insert(e);
        }
        self
    }

    /// Force results into this schema
    pub fn structured_output(mut self, spec: StructuredOutputSpec) -> Self {
        self.structured = Some(spec);
        self
    }

    /// Shorthand for [`AgentBuilder::structured_output`]
    pub fn output_schema(self, result_type_name: impl Into<String>, schema: Value) -> Self {
        self.structured_output(StructuredOutputSpec::new(result_type_name, schema))
    }

    pub fn memory(mut self, memory: Memory) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    /// Validate settings and construct the agent
    pub fn build(self) -> Result<Agent> {
        if let Some(e) = self.registration_error {
            return Err(e);
        }
        if self.max_iterations == 0 {
            return Err(AgentError::config("max_iterations must be at least 1"));
        }
        if let Some(spec) = &self.structured {
            if self.registry.lookup(&spec.result_type_name).is_some() {
                return Err(AgentError::config(format!(
                    "structured output name '{}' collides with a registered tool",
                    spec.result_type_name
                )));
            }
        }

        let provider = match self.provider {
            Some(provider) => provider,
            None => create_provider(&self.provider_config)?,
        };

        let dispatcher = ParallelDispatcher::new(Arc::new(self.registry))
            .with_max_concurrency(self.max_concurrency)
            .with_tool_timeout(self.tool_timeout);

        Ok(Agent {
            transport: RetryingTransport::new(provider, self.retry),
            dispatcher,
            system_template: self.system_template,
            structured: self.structured.map(StructuredOutputBroker::new),
            memory: self.memory,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            max_iterations: self.max_iterations,
        })
    }
}
