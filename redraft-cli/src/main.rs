//! # redraft CLI
//!
//! Command-line interface for the redraft drafting agent.
//!
//! Usage:
//!   redraft <task>
//!   redraft --iterations 5 --root out <task>
//!   redraft format
//!
//! Examples:
//!   redraft "Write a rate limiter module in src/limiter.rs"
//!   redraft -i 1 -r sandbox "Create a README for this tool"
//!   redraft --provider anthropic --effort high "Port parse.py to Rust"
//!   redraft format

use clap::{Parser, Subcommand, ValueEnum};
use redraft_agent::{Session, SessionConfig};
use redraft_engine::patch::{PatchBlock, PatchEngine, PatchOperation};
use redraft_engine::provider::{
    AnthropicProvider, LlmProvider, OpenAIProvider, ProviderConfig, ReasoningEffort,
};

#[derive(Parser)]
#[command(name = "redraft")]
#[command(author, version, about = "redraft - iterative code drafting with model self-review")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Task to execute (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    task: Vec<String>,

    /// Number of generate rounds; each non-final round adds a review pass
    #[arg(short, long, global = true, default_value = "3")]
    iterations: usize,

    /// Output root that patch blocks are applied under
    #[arg(short, long, global = true, default_value = ".")]
    root: String,

    /// Which chat completion provider to call
    #[arg(short, long, global = true, value_enum, default_value_t = ProviderKind::Openai)]
    provider: ProviderKind,

    /// Model identifier (provider default when omitted)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Max output token budget per call
    #[arg(long, global = true)]
    max_tokens: Option<usize>,

    /// Reasoning effort hint
    #[arg(long, global = true, value_enum)]
    effort: Option<EffortArg>,

    /// Write the run transcript to this file as JSON
    #[arg(long, global = true)]
    transcript: Option<String>,

    /// Quiet mode - only show the final summary
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a drafting session
    Run {
        /// The task description
        #[arg(trailing_var_arg = true, required = true)]
        task: Vec<String>,
    },
    /// Show the patch block wire format
    Format,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderKind {
    Openai,
    Anthropic,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EffortArg {
    Low,
    Medium,
    High,
}

impl From<EffortArg> for ReasoningEffort {
    fn from(effort: EffortArg) -> Self {
        match effort {
            EffortArg::Low => ReasoningEffort::Low,
            EffortArg::Medium => ReasoningEffort::Medium,
            EffortArg::High => ReasoningEffort::High,
        }
    }
}

fn show_format() {
    let example = PatchBlock::new(
        "src/lib.rs",
        "add-parse-fn",
        12,
        PatchOperation::Modify,
        "pub fn parse(input: &str) -> Result<Ast, ParseError> {",
    );

    println!("A patch block frames one file edit between two delimiter lines:");
    println!();
    println!("{}", example.render());
    println!();
    println!("- The delimiter line is exactly fifty '-' characters.");
    println!("- The metadata line is a single-line JSON object with exactly the");
    println!("  keys file, blockId, startLine and operation.");
    println!("- operation is one of \"append\", \"modify\", \"insert\", \"delete\".");
    println!("- startLine is 1-indexed and must be a positive integer.");
    println!("- modify/delete cover the lines the trimmed content spans,");
    println!("  starting at startLine; append ignores startLine; insert places");
    println!("  the content before startLine.");
}

fn api_key(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(key) if !key.is_empty() => Some(key),
        _ => None,
    }
}

async fn run_task(cli: &Cli, task: &str) {
    match cli.provider {
        ProviderKind::Openai => {
            let Some(key) = api_key("OPENAI_API_KEY") else {
                eprintln!("Error: OPENAI_API_KEY is not set");
                std::process::exit(2);
            };
            drive(OpenAIProvider::new(ProviderConfig::openai(key)), cli, task).await;
        }
        ProviderKind::Anthropic => {
            let Some(key) = api_key("ANTHROPIC_API_KEY") else {
                eprintln!("Error: ANTHROPIC_API_KEY is not set");
                std::process::exit(2);
            };
            drive(AnthropicProvider::new(ProviderConfig::anthropic(key)), cli, task).await;
        }
    }
}

async fn drive<P: LlmProvider>(provider: P, cli: &Cli, task: &str) {
    let config = SessionConfig {
        max_iterations: cli.iterations,
        model: cli.model.clone(),
        max_output_tokens: cli.max_tokens,
        reasoning_effort: cli.effort.map(Into::into),
        verbose: !cli.quiet,
    };

    let mut session = Session::new(provider, PatchEngine::new(&cli.root), config);

    // First Ctrl+C stops cleanly between rounds; a second one kills the
    // process as usual since this handler only fires once.
    let token = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStop requested - finishing the current round");
            token.cancel();
        }
    });

    match session.run(task).await {
        Ok(outcome) => {
            let applied: usize = outcome.reports.iter().map(|r| r.applied.len()).sum();
            let skipped: usize = outcome.reports.iter().map(|r| r.skipped.len()).sum();

            if !cli.quiet {
                println!("\n--- RUN SUMMARY ---");
            }
            println!(
                "Rounds completed: {}{}",
                outcome.rounds_completed,
                if outcome.stopped_early { " (stopped early)" } else { "" }
            );
            println!("Blocks applied: {}", applied);
            if skipped > 0 {
                println!("Blocks skipped: {}", skipped);
                for report in &outcome.reports {
                    for skip in &report.skipped {
                        match &skip.file {
                            Some(file) => println!("  - {}: {}", file, skip.reason),
                            None => println!("  - {}", skip.reason),
                        }
                    }
                }
            }

            if !cli.quiet {
                let usage = session.usage();
                println!(
                    "Calls: {} ({} prompt + {} completion tokens)",
                    usage.total_calls, usage.total_prompt_tokens, usage.total_completion_tokens
                );
            }

            if let Some(path) = &cli.transcript {
                match serde_json::to_string_pretty(&outcome.transcript) {
                    Ok(json) => {
                        if let Err(e) = std::fs::write(path, json) {
                            eprintln!("Failed to write transcript {}: {}", path, e);
                        } else if !cli.quiet {
                            println!("Transcript written to {}", path);
                        }
                    }
                    Err(e) => eprintln!("Failed to serialize transcript: {}", e),
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Format) => {
            show_format();
            return;
        }
        Some(Commands::Run { task }) => {
            let task_str = task.join(" ");
            run_task(&cli, &task_str).await;
            return;
        }
        None => {
            if cli.task.is_empty() {
                eprintln!("Error: No task provided.");
                eprintln!("Usage: redraft [OPTIONS] <TASK>...");
                eprintln!("       redraft run <TASK>...");
                eprintln!("       redraft format");
                eprintln!("\nExamples:");
                eprintln!("  redraft \"Write a rate limiter module in src/limiter.rs\"");
                eprintln!("  redraft -i 1 -r sandbox \"Create a README for this tool\"");
                eprintln!("  redraft --help");
                std::process::exit(1);
            }
        }
    }

    // Default: run task from positional args
    let task_str = cli.task.join(" ");
    run_task(&cli, &task_str).await;
}
