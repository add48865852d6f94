//! Tandem CLI - Command line interface for Tandem
//!
//! Generate code with Claude Code, review it with Gemini, run the tests,
//! and try one automated fix when they fail.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tandem_core::{CliOverrides, Config, Secrets};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::RunArgs;

/// Tandem: generate, review, test, and self-heal once
#[derive(Parser, Debug)]
#[command(name = "tandem")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to claude executable (overrides config and env)
    #[arg(long, global = true, env = "TANDEM_CLAUDE_PATH")]
    claude_path: Option<String>,

    /// Model for the generation agent (overrides config and env)
    #[arg(long, global = true, env = "TANDEM_MODEL")]
    model: Option<String>,

    /// Model for the review agent (overrides config and env)
    #[arg(long, global = true, env = "TANDEM_REVIEW_MODEL")]
    review_model: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run the generate → review → test pipeline
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Show current configuration
    Config,

    /// Create a secrets file template for the Gemini API key
    InitSecrets,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let overrides = CliOverrides {
        claude_path: cli.claude_path.clone(),
        model: cli.model.clone(),
        review_model: cli.review_model.clone(),
        ..Default::default()
    };

    match cli.command {
        Some(Commands::Version) => {
            println!("tandem {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Run(args)) => {
            return args.execute(cli.verbose, overrides).await;
        }
        Some(Commands::Config) => {
            let config = Config::load_with_overrides(overrides)?;
            print_config(&config)?;
        }
        Some(Commands::InitSecrets) => {
            let path = Secrets::create_template()?;
            println!("Created {}", path.display());
            println!("Add your Gemini API key there, or set GOOGLE_API_KEY.");
        }
        None => {
            println!("Tandem - generate, review, test, and self-heal once");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_config(config: &Config) -> anyhow::Result<()> {
    println!("Tandem Configuration");
    println!("====================");
    println!();
    println!("Generation agent:");
    println!("  claude_path: {}", config.agent.claude_path);
    println!("  model: {}", config.agent.model.as_deref().unwrap_or("(default)"));
    println!("  timeout: {:?}", config.agent.timeout);
    println!();
    println!("Review agent:");
    println!("  model: {}", config.review.model);
    println!("  base_url: {}", config.review.base_url);
    println!("  max_retries: {}", config.review.max_retries);
    let has_key = Secrets::load()?.google_api_key().is_some();
    println!("  api key: {}", if has_key { "configured" } else { "MISSING" });
    println!();
    println!("Tests:");
    println!("  command: {}", config.tests.command);
    println!("  timeout: {:?}", config.tests.timeout);
    println!();
    println!("Report: {}", config.report.path.display());
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
    Ok(())
}
