//! basic-agent - LLM agent with tools and structured output
//!
//! Main entry point for the CLI application.

use anyhow::Context;
use basic_agent::core::config::ProviderKind;
use basic_agent::tools::{register_builtin_tools, ToolRegistry};
use basic_agent::{cli, Agent, Config, Repl, RunOptions};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// basic-agent - LLM agent with tools and structured output
#[derive(Parser, Debug)]
#[command(name = "basic-agent")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend to use
    #[arg(long, value_enum)]
    provider: Option<ProviderKind>,

    /// Model name (defaults per provider)
    #[arg(long, short = 'm')]
    model: Option<String>,

    /// System prompt template; `{{ deps.field }}` reads from --deps
    #[arg(long, short = 's')]
    system: Option<String>,

    /// Maximum provider calls per run
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Sampling temperature
    #[arg(long, short = 't')]
    temperature: Option<f32>,

    /// JSON object passed to the system template as `deps`
    #[arg(long)]
    deps: Option<String>,

    /// Memory item to load before each run and update after it
    #[arg(long)]
    memory_id: Option<String>,

    /// Enable debug output
    #[arg(long, short = 'd')]
    debug: bool,

    /// Single prompt mode (non-interactive)
    #[arg(long, short = 'p')]
    prompt: Option<String>,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Build configuration
    let mut config = Config::load()?;

    // Apply CLI overrides
    if let Some(provider) = args.provider {
        config.provider.kind = provider;
    }

    if let Some(ref model) = args.model {
        config.provider.model = Some(model.clone());
    }

    if let Some(ref system) = args.system {
        config.agent.system_prompt = system.clone();
    }

    if let Some(max_iterations) = args.max_iterations {
        config.agent.max_iterations = max_iterations;
    }

    if args.temperature.is_some() {
        config.agent.temperature = args.temperature;
    }

    if args.debug {
        config.agent.debug = true;
    }

    init_tracing(config.agent.debug);
    config.validate()?;

    let deps = args
        .deps
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("--deps must be valid JSON")?;

    let mut tools = ToolRegistry::new();
    register_builtin_tools(&mut tools)?;

    let agent = Agent::builder().config(&config).tools(tools).build()?;

    // Single prompt mode
    if let Some(prompt) = args.prompt {
        let mut options = RunOptions::new();
        if let Some(deps) = deps {
            options = options.deps(deps);
        }
        if let Some(memory_id) = args.memory_id {
            options = options.memory_id(memory_id);
        }
        let result = agent.run_with(&prompt, options).await?;
        cli::print_result(&result);
        return Ok(());
    }

    // Interactive REPL mode
    let mut repl = Repl::new(agent)
        .with_deps(deps)
        .with_memory_id(args.memory_id);
    repl.run().await?;

    Ok(())
}
