//! Agent module - orchestration and conversation management
//!
//! Contains the main agent loop that coordinates LLM calls and tool execution,
//! plus structured output forcing and persistent memory.

pub mod conversation;
pub mod loop_state;
pub mod memory;
pub mod orchestrator;
pub mod structured;

pub use conversation::Conversation;
pub use loop_state::{AgentLoopState, LoopPhase};
pub use memory::{InMemoryStore, JsonFileStore, Memory, MemoryStore};
pub use orchestrator::{Agent, AgentBuilder, RunOptions};
pub use structured::{StructuredOutputBroker, StructuredOutputSpec};
