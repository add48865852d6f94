//! Claude Code generation agent

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::exec::{CommandExecutor, CommandSpec, ProcessExecutor};
use crate::{Error, Result};

use super::GenerationAgent;

/// Runs `claude -p <task>` and returns what it prints
#[derive(Clone)]
pub struct ClaudeAgent {
    claude_path: String,
    model: Option<String>,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    workdir: Option<PathBuf>,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for ClaudeAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeAgent")
            .field("claude_path", &self.claude_path)
            .field("model", &self.model)
            .field("extra_args", &self.extra_args)
            .field("timeout", &self.timeout)
            .field("workdir", &self.workdir)
            .finish_non_exhaustive()
    }
}

impl ClaudeAgent {
    /// Create a new Claude agent with default settings
    pub fn new() -> Self {
        Self {
            claude_path: "claude".to_string(),
            model: None,
            extra_args: Vec::new(),
            timeout: None,
            workdir: None,
            executor: Arc::new(ProcessExecutor::new()),
        }
    }

    /// Create an agent from the `[agent]` configuration section
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut agent = Self::new()
            .with_path(&config.claude_path)
            .with_extra_args(config.extra_args.clone())
            .with_timeout(config.timeout);
        if let Some(ref model) = config.model {
            agent = agent.with_model(model);
        }
        agent
    }

    /// Use a custom path to the claude executable
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.claude_path = path.into();
        self
    }

    /// Use a specific model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Pass extra arguments ahead of the prompt
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Kill the agent if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run the agent in a specific working directory
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Swap the process executor
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Build the invocation for `task`
    ///
    /// The task is one argv element, so quotes, `$(...)` and newlines in it
    /// reach the agent untouched.
    pub fn build_command(&self, task: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.claude_path).args(self.extra_args.iter().cloned());

        if let Some(ref model) = self.model {
            spec = spec.arg("--model").arg(model);
        }

        spec = spec.arg("-p").arg(task);

        if let Some(ref dir) = self.workdir {
            spec = spec.current_dir(dir);
        }
        if let Some(timeout) = self.timeout {
            spec = spec.timeout(timeout);
        }
        spec
    }
}

impl Default for ClaudeAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationAgent for ClaudeAgent {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn generate(&self, task: &str) -> Result<String> {
        let spec = self.build_command(task);
        debug!(claude_path = %self.claude_path, task_len = task.len(), "Invoking generation agent");

        let output = self.executor.execute(&spec).await.map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => Error::Agent(format!(
                "Claude executable not found at '{}'. Is Claude Code installed?",
                self.claude_path
            )),
            other => other,
        })?;

        if !output.success() {
            return Err(Error::AgentInvocation {
                status: output.status_description(),
                stderr: output.stderr.trim().to_string(),
            });
        }

        if output.stdout.trim().is_empty() {
            warn!(claude_path = %self.claude_path, "Generation agent returned no output");
        }

        Ok(output.stdout)
    }
}
