//! CLI commands
//!
//! Special commands that can be executed in the REPL.

use serde_json::Value;

use crate::agent::Agent;

/// Result of parsing a command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Run the input through the agent
    Continue(String),
    /// Command was handled, show output
    Handled(String),
    /// Exit the REPL
    Exit,
}

/// Parse and handle special commands
pub fn handle_command(input: &str, agent: &Agent, deps: Option<&Value>) -> CommandResult {
    let input = input.trim();
    let cmd = input.split_whitespace().next().unwrap_or("").to_lowercase();

    match cmd.as_str() {
        "exit" | "quit" | "q" => CommandResult::Exit,

        "help" | "?" => CommandResult::Handled(help_text()),

        "status" => CommandResult::Handled(status_text(agent, deps)),

        "tools" => CommandResult::Handled(tools_text(agent)),

        _ => {
            if input.starts_with('/') {
                CommandResult::Handled(format!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    cmd
                ))
            } else {
                CommandResult::Continue(input.to_string())
            }
        }
    }
}

fn status_text(agent: &Agent, deps: Option<&Value>) -> String {
    format!(
        "Agent Status:\n\
         ─────────────────────────────\n\
         Provider:       {}\n\
         Model:          {}\n\
         Max iterations: {}\n\
         Tools:          {}\n\
         Structured:     {}\n\
         Deps:           {}",
        agent.provider_name(),
        agent.model(),
        agent.max_iterations(),
        agent.registry().len(),
        agent
            .structured_output()
            .map(|s| s.result_type_name.as_str())
            .unwrap_or("off"),
        deps.map(|d| d.to_string()).unwrap_or_else(|| "none".to_string()),
    )
}

fn tools_text(agent: &Agent) -> String {
    let registry = agent.registry();
    if registry.is_empty() {
        return "No tools registered.".to_string();
    }

    let mut output = String::from("Registered tools:\n");
    for schema in registry.list_schemas() {
        output.push_str(&format!("  {:<16} {}\n", schema.name, schema.description));
    }
    output.trim_end().to_string()
}

/// Generate help text
fn help_text() -> String {
    r#"Commands:
─────────────────────────────────────────────
  help, ?          Show this help message
  exit, quit, q    Exit
  status           Show provider, model and limits
  tools            List registered tools

Every other line is sent to the agent as a new run.

Keyboard Shortcuts:
  Ctrl+C           Cancel the current run
  Ctrl+D           Exit
─────────────────────────────────────────────"#
        .to_string()
}
