//! Workflow module for coordinating the agents and the test runner
//!
//! The only workflow is the generate → review → test pipeline with one
//! self-healing debug/fix/retest cycle.

pub mod pipeline;
pub mod state;

pub use pipeline::{debug_context, fix_task, titles, NoProgress, Pipeline, ProgressSink};
pub use state::{Phase, RunOutcome, WorkflowState};
