//! Test runner integration
//!
//! Runs the operator-configured test command through the platform shell and
//! reports pass/fail with the captured output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::TestsConfig;
use crate::exec::{CommandExecutor, CommandSpec, ProcessExecutor};
use crate::{Error, Result};

/// Shell exit codes meaning the command itself could not be run
const EXIT_NOT_EXECUTABLE: i32 = 126;
const EXIT_NOT_FOUND: i32 = 127;

/// Results of a test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Whether the command exited with code zero
    pub success: bool,
    /// Stdout followed by stderr
    pub output: String,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Duration of the test run
    pub duration: Duration,
}

impl TestResult {
    /// Get a summary string
    pub fn summary(&self) -> String {
        let status = if self.success { "passed" } else { "failed" };
        match self.exit_code {
            Some(code) => format!("{} (exit code {}, {}ms)", status, code, self.duration.as_millis()),
            None => format!("{} (terminated, {}ms)", status, self.duration.as_millis()),
        }
    }
}

/// Test runner that executes the configured command
#[derive(Clone)]
pub struct TestRunner {
    command: String,
    workdir: Option<PathBuf>,
    timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestRunner")
            .field("command", &self.command)
            .field("workdir", &self.workdir)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TestRunner {
    /// Create a test runner for `command`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            workdir: None,
            timeout: Duration::from_secs(600), // 10 minute default timeout
            executor: Arc::new(ProcessExecutor::new()),
        }
    }

    /// Create a test runner from the `[tests]` configuration section
    pub fn from_config(config: &TestsConfig) -> Self {
        Self::new(&config.command).with_timeout(config.timeout)
    }

    /// Run in a specific directory instead of the inherited one
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Set the timeout for test execution
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Swap the process executor
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// The configured test command
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Build the shell invocation for the test command
    pub fn build_command(&self) -> CommandSpec {
        #[cfg(windows)]
        let spec = CommandSpec::new("cmd").args(["/C", self.command.as_str()]);
        #[cfg(not(windows))]
        let spec = CommandSpec::new("sh").args(["-c", self.command.as_str()]);

        let spec = spec.timeout(self.timeout);
        match self.workdir {
            Some(ref dir) => spec.current_dir(dir),
            None => spec,
        }
    }

    /// Run tests and return results
    ///
    /// Failing tests are an `Ok` result with `success == false`. An `Err` means
    /// the tests could not be run at all: the shell failed to start, the
    /// command was not found or not executable, or the run timed out.
    pub async fn run(&self) -> Result<TestResult> {
        debug!(command = %self.command, "Running tests");

        let output = self
            .executor
            .execute(&self.build_command())
            .await
            .map_err(|e| match e {
                Error::Timeout { elapsed, .. } => Error::TestExecution(format!(
                    "'{}' timed out after {:?}",
                    self.command, elapsed
                )),
                Error::Io(io) => {
                    Error::TestExecution(format!("failed to start '{}': {}", self.command, io))
                }
                other => other,
            })?;

        if matches!(output.exit_code, Some(EXIT_NOT_EXECUTABLE | EXIT_NOT_FOUND)) {
            return Err(Error::TestExecution(format!(
                "'{}' could not be executed ({}): {}",
                self.command,
                output.status_description(),
                output.stderr.trim()
            )));
        }

        let result = TestResult {
            success: output.success(),
            output: output.combined(),
            exit_code: output.exit_code,
            duration: output.duration,
        };

        info!(command = %self.command, result = %result.summary(), "Tests finished");
        Ok(result)
    }
}
