//! Agent loop state management
//!
//! Tracks one run of the request/dispatch loop: how many provider calls have
//! been made, which tool choice the next request carries, and the usage
//! summed so far.

use crate::core::Usage;
use crate::llm::{ProviderResponse, ToolChoice};

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Prompt rendered, nothing sent yet
    Init,
    /// Waiting on the provider
    AwaitingResponse,
    /// Running the tools of the last response
    Dispatching,
    /// Final answer or structured result produced
    Done,
    /// Run ended with an error
    Failed,
}

/// State of the agent loop
#[derive(Debug, Clone)]
pub struct AgentLoopState {
    /// Provider calls made so far in the tool loop
    pub iteration: usize,
    /// Maximum allowed provider calls in the tool loop
    pub max_iterations: usize,
    /// Choice sent with the next request
    pub tool_choice: ToolChoice,
    /// Usage summed over every provider call of the run
    pub usage: Usage,
    /// Completed provider calls, including memory updates
    pub provider_calls: usize,
    /// Text of the latest response, if any
    pub last_text: Option<String>,
    pub phase: LoopPhase,
}

impl AgentLoopState {
    /// Create a new loop state
    pub fn new(max_iterations: usize, tool_choice: ToolChoice) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            tool_choice,
            usage: Usage::default(),
            provider_calls: 0,
            last_text: None,
            phase: LoopPhase::Init,
        }
    }

    /// Check if the loop may make another provider call
    pub fn should_continue(&self) -> bool {
        self.iteration < self.max_iterations
            && !matches!(self.phase, LoopPhase::Done | LoopPhase::Failed)
    }

    /// Whether the call just made was the last one allowed
    pub fn is_last_iteration(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// Count a loop iteration and fold its response in
    pub fn record_response(&mut self, response: &ProviderResponse) {
        self.iteration += 1;
        self.record_call(response);
        self.last_text = response.text.clone().filter(|t| !t.is_empty());
    }

    /// Count a provider call that sits outside the loop
    pub fn record_call(&mut self, response: &ProviderResponse) {
        self.provider_calls += 1;
        self.usage.add(response.usage);
    }

    /// Stop forcing a particular tool
    pub fn relax_tool_choice(&mut self) {
        self.tool_choice = ToolChoice::Auto;
    }

    pub fn enter(&mut self, phase: LoopPhase) {
        self.phase = phase;
    }
}
