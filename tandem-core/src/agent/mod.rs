//! Generation agent: delegates a coding task to an external CLI agent

mod claude;

use async_trait::async_trait;

use crate::Result;

pub use claude::ClaudeAgent;

/// An external agent that turns a task description into code
#[async_trait]
pub trait GenerationAgent: Send + Sync {
    /// Get the name of this agent
    fn name(&self) -> &'static str;

    /// Run the agent on `task` and return its raw textual output
    async fn generate(&self, task: &str) -> Result<String>;
}
