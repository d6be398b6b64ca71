//! Conversation history management
//!
//! One run owns one conversation. Messages are only ever appended, and the
//! system prompt travels beside the history rather than inside it.

use crate::core::{Message, Role, ToolCall, ToolResult};

/// History of a single run
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Rendered system prompt, sent with every request
    system_prompt: String,
    /// Message history
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation with a rendered system prompt
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Add a user message
    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Add an assistant text message
    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Add the assistant turn that requested tools
    pub fn add_tool_use(&mut self, text: Option<&str>, calls: &[ToolCall]) {
        self.messages.push(Message::assistant_tool_use(text, calls));
    }

    /// Add one tool turn answering the previous assistant turn
    pub fn add_tool_results(&mut self, results: Vec<ToolResult>) {
        self.messages.push(Message::tool_results(results));
    }

    /// Get messages without system prompt
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Ids of tool calls in the last assistant turn that have no result yet
    pub fn pending_call_ids(&self) -> Vec<String> {
        let Some(position) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)
        else {
            return Vec::new();
        };

        let answered: Vec<&str> = self.messages[position + 1..]
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|c| c.as_tool_result())
            .map(|r| r.call_id.as_str())
            .collect();

        self.messages[position]
            .tool_calls()
            .into_iter()
            .filter(|call| !answered.contains(&call.id.as_str()))
            .map(|call| call.id.clone())
            .collect()
    }

    /// Get message count
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
