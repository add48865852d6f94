//! Review agent seam
//!
//! A review agent is a generative model asked to play a role (code reviewer,
//! debugger) over some context text. It keeps no memory between calls; the
//! role and context are the whole request.

use async_trait::async_trait;

use crate::Result;

/// Role used to critique freshly generated code
pub const SENIOR_REVIEWER_ROLE: &str = "senior code reviewer";

/// Role used to analyse a failing test run
pub const DEBUGGER_ROLE: &str = "debugging expert";

/// A model service that produces role-framed analysis of text
#[async_trait]
pub trait ReviewAgent: Send + Sync {
    /// Get the name of this agent
    fn name(&self) -> &'static str;

    /// Ask the model to act as `role` on `context` and return its text
    async fn review(&self, role: &str, context: &str) -> Result<String>;
}

/// Build the instruction sent to the model
///
/// `context` is embedded byte-for-byte after a blank line.
pub fn build_review_prompt(role: &str, context: &str) -> String {
    format!(
        "You are a {}. Analyze the following context and propose a solution or review.\n\n{}",
        role, context
    )
}
