//! Interactive REPL
//!
//! Provides the main user interaction loop. Every line is an independent run.

use serde_json::Value;
use std::io::{self, BufRead, Write};
use tokio_util::sync::CancellationToken;

use crate::agent::{Agent, RunOptions};
use crate::cli::commands::{handle_command, CommandResult};
use crate::core::{AgentError, Result, RunResult};

/// Interactive REPL (Read-Eval-Print Loop)
pub struct Repl {
    agent: Agent,
    deps: Option<Value>,
    memory_id: Option<String>,
}

impl Repl {
    /// Create a REPL around a built agent
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            deps: None,
            memory_id: None,
        }
    }

    /// Values passed to the system template on every run
    pub fn with_deps(mut self, deps: Option<Value>) -> Self {
        self.deps = deps;
        self
    }

    /// Memory item loaded and updated on every run
    pub fn with_memory_id(mut self, memory_id: Option<String>) -> Self {
        self.memory_id = memory_id;
        self
    }

    /// Run the REPL
    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            // Print prompt
            print!("You: ");
            stdout.flush()?;

            // Read input
            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF (Ctrl+D)
                    println!("\nGoodbye!");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    continue;
                }
            }

            let input = input.trim();

            if input.is_empty() {
                continue;
            }

            // Handle commands
            match handle_command(input, &self.agent, self.deps.as_ref()) {
                CommandResult::Exit => {
                    println!("\nGoodbye!");
                    break;
                }
                CommandResult::Handled(output) => {
                    println!("{}\n", output);
                }
                CommandResult::Continue(input) => match self.run_once(&input).await {
                    Ok(result) => print_result(&result),
                    Err(AgentError::Cancelled) => println!("\nCancelled.\n"),
                    Err(e) => eprintln!("\nError: {}\n", e),
                },
            }
        }

        Ok(())
    }

    /// Run one message, cancelling it on Ctrl+C
    async fn run_once(&self, input: &str) -> Result<RunResult> {
        let cancel = CancellationToken::new();
        let mut options = RunOptions::new().cancel(cancel.clone());
        if let Some(deps) = &self.deps {
            options = options.deps(deps.clone());
        }
        if let Some(memory_id) = &self.memory_id {
            options = options.memory_id(memory_id.clone());
        }

        let run = self.agent.run_with(input, options);
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                run.await
            }
        }
    }

    /// Print the startup banner
    fn print_banner(&self) {
        println!();
        println!("basic-agent");
        println!("Provider:   {}", self.agent.provider_name());
        println!("Model:      {}", self.agent.model());
        println!("Tools:      {}", self.agent.registry().names().join(", "));
        if let Some(memory_id) = &self.memory_id {
            println!("Memory:     {}", memory_id);
        }
        println!();
        println!("Commands: help, status, tools, exit");
        println!("─────────────────────────────────────────────────────────────");
    }
}

/// Print a run's output and its usage line
pub fn print_result(result: &RunResult) {
    println!("\nAssistant:\n{}\n", result.output);
    println!(
        "[{} provider call(s), {} input / {} output tokens]\n",
        result.provider_calls, result.usage.input_tokens, result.usage.output_tokens
    );
}
