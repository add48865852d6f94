//! Error types for Gemini requests

use thiserror::Error;

/// Result type for Gemini operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to the Gemini API
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure (connect, timeout, body read)
    #[error("Gemini request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Missing or rejected API key
    #[error("Gemini authentication error: {0}")]
    Auth(String),

    /// Rate limit or temporary quota exhaustion
    #[error("Gemini rate limit exceeded: {0}")]
    RateLimited(String),

    /// Any other non-success HTTP status
    #[error("Gemini API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A successful response carried no text
    #[error("Gemini returned no text: {0}")]
    EmptyResponse(String),

    /// Invalid configuration (base URL, model name)
    #[error("Invalid Gemini configuration: {0}")]
    Config(String),

    /// Response body was not the expected JSON
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::RateLimited(_) => true,
            Error::Api { status, .. } => (500..=599).contains(status),
            Error::Auth(_)
            | Error::EmptyResponse(_)
            | Error::Config(_)
            | Error::Parse(_) => false,
        }
    }
}

impl From<Error> for tandem_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Auth(message) => tandem_core::Error::Authentication(message),
            Error::RateLimited(message) => tandem_core::Error::Service {
                status: Some(429),
                message,
            },
            Error::Api { status, message } => tandem_core::Error::Service {
                status: Some(status),
                message,
            },
            Error::Http(e) => tandem_core::Error::Service {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            },
            Error::EmptyResponse(reason) => tandem_core::Error::EmptyResponse(reason),
            Error::Config(message) => tandem_core::Error::Config(message),
            Error::Parse(message) => tandem_core::Error::Service {
                status: None,
                message,
            },
        }
    }
}
