//! Tandem Core - Core library for Tandem
//!
//! This crate drives a code-generation agent, a review model and a test
//! command through a generate → review → test pipeline with one automated
//! debug/fix/retest cycle, recording every step to a markdown report.

pub mod agent;
pub mod config;
pub mod error;
pub mod exec;
pub mod report;
pub mod review;
pub mod secrets;
pub mod test_runner;
pub mod workflow;

pub use agent::{ClaudeAgent, GenerationAgent};
pub use config::{AgentConfig, CliOverrides, Config, ReportConfig, ReviewConfig, TestsConfig};
pub use error::{Error, Result};
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, ProcessExecutor};
pub use report::{Report, ReportEntry};
pub use review::{build_review_prompt, ReviewAgent, DEBUGGER_ROLE, SENIOR_REVIEWER_ROLE};
pub use secrets::Secrets;
pub use test_runner::{TestResult, TestRunner};
pub use workflow::{Phase, Pipeline, ProgressSink, RunOutcome};
