//! Tandem Gemini - Gemini review agent for Tandem
//!
//! This crate implements the core `ReviewAgent` seam on top of the Gemini
//! `generateContent` HTTP API, with retry and backoff for transient failures.

mod api;
mod client;
mod error;

pub use client::{GeminiClient, RetryPolicy};
pub use error::{Error, Result};
