//! Run command - Execute the generate → review → test pipeline

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tandem_core::workflow::titles;
use tandem_core::{
    ClaudeAgent, CliOverrides, Config, GenerationAgent, Phase, Pipeline, ProgressSink, Report,
    RunOutcome, Secrets, TestRunner,
};
use tandem_gemini::GeminiClient;
use tokio_util::sync::CancellationToken;

/// Exit status when a second interrupt abandons the step in flight
const FORCED_EXIT: u8 = 130;

/// Task used when none is given on the command line
pub const DEFAULT_TASK: &str =
    "Build a simple memo API with FastAPI, and write pytest unit tests for it.";

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// The task describing what to build
    #[arg(conflicts_with = "task_file")]
    pub task: Option<String>,

    /// Read the task from a file instead
    #[arg(long)]
    pub task_file: Option<PathBuf>,

    /// Working directory for the agent and tests (defaults to current directory)
    #[arg(short = 'd', long, default_value = ".")]
    pub workdir: PathBuf,

    /// Test command (overrides config and env)
    #[arg(long, env = "TANDEM_TEST_COMMAND")]
    pub test_cmd: Option<String>,

    /// Report file (overrides config and env)
    #[arg(long, env = "TANDEM_REPORT_PATH")]
    pub report: Option<PathBuf>,

    /// Dry run - show what would be executed without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Prints one line per pipeline step
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn step(&self, phase: Phase, detail: &str) {
        println!("[*] {}: {}", phase, preview(detail, 50));
    }
}

/// First `max` characters of the first line of `text`
fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    let mut out: String = line.chars().take(max).collect();
    if line.chars().count() > max || text.lines().nth(1).is_some() {
        out.push_str("...");
    }
    out
}

/// Wire the collaborators into a pipeline
///
/// The reviewer is built first, so a missing `api_key` fails here and the
/// report at `report_path` is left as it was.
fn assemble(
    config: &Config,
    api_key: Option<String>,
    generator: Arc<dyn GenerationAgent>,
    tests: TestRunner,
    report_path: &Path,
) -> anyhow::Result<Pipeline> {
    let reviewer = GeminiClient::new(&config.review, api_key)?;
    Ok(Pipeline::new(
        generator,
        Arc::new(reviewer),
        tests,
        Report::new(report_path),
    ))
}

/// Cancel `cancel` on the first interrupt and return on the second
///
/// The first interrupt lets the pipeline stop between steps. Returning
/// means the step in flight should be abandoned. If the signal source
/// fails this never returns.
async fn watch_interrupts<F, Fut>(cancel: CancellationToken, mut interrupt: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return std::future::pending().await;
    }
    eprintln!("[!] Interrupted; stopping after the current step (Ctrl-C again to abort now)");
    cancel.cancel();

    if interrupt().await.is_err() {
        return std::future::pending().await;
    }
    eprintln!("[!] Interrupted again; abandoning the current step");
}

impl RunArgs {
    /// Resolve the task text
    fn task(&self) -> anyhow::Result<String> {
        if let Some(ref path) = self.task_file {
            let task = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read task file {}", path.display()))?;
            anyhow::ensure!(!task.trim().is_empty(), "Task file {} is empty", path.display());
            return Ok(task);
        }
        Ok(self.task.clone().unwrap_or_else(|| DEFAULT_TASK.to_string()))
    }

    /// Resolve the report location against the working directory
    fn report_path(config: &Config, workdir: &Path) -> PathBuf {
        if config.report.path.is_absolute() {
            config.report.path.clone()
        } else {
            workdir.join(&config.report.path)
        }
    }

    /// Execute the run command
    pub async fn execute(&self, verbose: bool, overrides: CliOverrides) -> anyhow::Result<ExitCode> {
        let config = Config::load_with_overrides(CliOverrides {
            test_command: self.test_cmd.clone(),
            report_path: self.report.clone(),
            ..overrides
        })?;

        // Resolve to absolute path
        let workdir = if self.workdir.is_absolute() {
            self.workdir.clone()
        } else {
            std::env::current_dir()?.join(&self.workdir)
        };
        anyhow::ensure!(
            workdir.is_dir(),
            "Working directory does not exist: {}",
            workdir.display()
        );

        let task = self.task()?;
        let report_path = Self::report_path(&config, &workdir);

        if verbose {
            tracing::info!(
                workdir = %workdir.display(),
                claude_path = %config.agent.claude_path,
                review_model = %config.review.model,
                test_command = %config.tests.command,
                report = %report_path.display(),
                "Starting tandem run"
            );
        }

        println!("Tandem Run");
        println!("==========");
        println!();
        println!("Task: {}", preview(&task, 72));
        println!("Working directory: {}", workdir.display());
        println!("Test command: {}", config.tests.command);
        println!("Report: {}", report_path.display());
        println!();

        let generator = ClaudeAgent::from_config(&config.agent).with_workdir(&workdir);
        let tests = TestRunner::from_config(&config.tests).with_workdir(&workdir);
        let api_key = Secrets::load()?.google_api_key();
        let pipeline = assemble(&config, api_key, Arc::new(generator), tests, &report_path)?;

        if self.dry_run {
            println!("[Dry run] Would generate with {}", config.agent.claude_path);
            println!("[Dry run] Would review with {}", config.review.model);
            println!(
                "[Dry run] Would test with `{}`, with one fix attempt on failure",
                config.tests.command
            );
            return Ok(ExitCode::SUCCESS);
        }

        let cancel = CancellationToken::new();
        let mut pipeline = pipeline
            .with_cancellation(cancel.clone())
            .with_progress(Arc::new(ConsoleProgress));

        let outcome = tokio::select! {
            result = pipeline.run(&task) => result?,
            () = watch_interrupts(cancel, tokio::signal::ctrl_c) => {
                Report::new(&report_path)
                    .append(titles::CANCELLED, "Abandoned during a step by a second interrupt")?;
                println!("See '{}' for the partial report.", report_path.display());
                return Ok(ExitCode::from(FORCED_EXIT));
            }
        };

        println!();
        match outcome {
            RunOutcome::Passed { .. } => println!("[Done] {}.", outcome),
            RunOutcome::Failed => println!("[!] Done, but {}.", outcome),
            RunOutcome::Aborted { .. } | RunOutcome::Cancelled { .. } => {
                println!("[!] Run {}.", outcome)
            }
        }
        println!("See '{}' for the full report.", report_path.display());

        Ok(ExitCode::from(outcome.exit_code() as u8))
    }
}
