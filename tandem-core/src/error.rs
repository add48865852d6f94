//! Error types for Tandem

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Tandem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Tandem operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error (including an unwritable report)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or rejected credential for the review service
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Agent could not be started
    #[error("Agent error: {0}")]
    Agent(String),

    /// Agent process ran but exited unsuccessfully
    #[error("Agent invocation failed ({status}): {stderr}")]
    AgentInvocation { status: String, stderr: String },

    /// Review service returned an error
    #[error("Review service error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Service { status: Option<u16>, message: String },

    /// Review service returned no usable text
    #[error("Review service returned an empty response: {0}")]
    EmptyResponse(String),

    /// Test command could not be run at all (as opposed to failing tests)
    #[error("Could not run tests: {0}")]
    TestExecution(String),

    /// An external call exceeded its time limit
    #[error("{what} timed out after {elapsed:?}")]
    Timeout { what: String, elapsed: Duration },

    /// The run was cancelled between steps
    #[error("Cancelled")]
    Cancelled,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
