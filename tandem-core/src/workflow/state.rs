//! Pipeline phases, in-memory run state, and run outcome

use crate::test_runner::TestResult;
use crate::{Error, Result};

/// Where a pipeline run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Nothing has run yet
    Init,
    /// Code generated from the task
    Generated,
    /// Code reviewed by the senior reviewer role
    Reviewed,
    /// First test run finished
    Tested,
    /// Failing tests analysed by the debugger role
    Debugging,
    /// Fix generated from the analysis
    Fixed,
    /// Second and last test run finished
    Retested,
    /// Terminal
    Done,
}

impl Phase {
    /// Check if moving from `self` to `to` is a legal step
    pub fn can_transition_to(&self, to: Phase) -> bool {
        matches!(
            (self, to),
            (Phase::Init, Phase::Generated)
                | (Phase::Generated, Phase::Reviewed)
                | (Phase::Reviewed, Phase::Tested)
                | (Phase::Tested, Phase::Done)
                | (Phase::Tested, Phase::Debugging)
                | (Phase::Debugging, Phase::Fixed)
                | (Phase::Fixed, Phase::Retested)
                | (Phase::Retested, Phase::Done)
        )
    }

    /// Whether the run has finished
    pub fn is_terminal(&self) -> bool {
        *self == Phase::Done
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Init => "Starting",
            Phase::Generated => "Generating code",
            Phase::Reviewed => "Reviewing code",
            Phase::Tested => "Running tests",
            Phase::Debugging => "Analysing test failure",
            Phase::Fixed => "Generating fix",
            Phase::Retested => "Re-running tests",
            Phase::Done => "Done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// State of one run; lives only as long as the run
#[derive(Debug, Clone)]
pub struct WorkflowState {
    /// The task as given at the start
    task: String,
    /// Last phase reached
    phase: Phase,
    /// Latest generation agent output
    generated: Option<String>,
    /// Latest test result
    last_test: Option<TestResult>,
}

impl WorkflowState {
    /// Create state for a fresh run
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            phase: Phase::Init,
            generated: None,
            last_test: None,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Latest generated code; empty before the first generation
    pub fn generated(&self) -> &str {
        self.generated.as_deref().unwrap_or_default()
    }

    pub fn last_test(&self) -> Option<&TestResult> {
        self.last_test.as_ref()
    }

    /// Replace the latest generated code
    pub fn record_generation(&mut self, code: String) {
        self.generated = Some(code);
    }

    /// Replace the latest test result
    pub fn record_test(&mut self, result: TestResult) {
        self.last_test = Some(result);
    }

    /// Move to `to`, rejecting steps the pipeline does not allow
    pub fn advance(&mut self, to: Phase) -> Result<()> {
        if !self.phase.can_transition_to(to) {
            return Err(Error::Other(format!(
                "illegal pipeline transition {:?} -> {:?}",
                self.phase, to
            )));
        }
        self.phase = to;
        Ok(())
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Tests pass; `fixed` is true when it took the debug/fix cycle
    Passed { fixed: bool },
    /// Pipeline completed but tests still fail after the one fix attempt
    Failed,
    /// A collaborator failed while working towards `phase`
    Aborted { phase: Phase, reason: String },
    /// Cancelled before `phase` started
    Cancelled { phase: Phase },
}

impl RunOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Passed { .. } => 0,
            RunOutcome::Failed => 1,
            RunOutcome::Aborted { .. } => 2,
            RunOutcome::Cancelled { .. } => 130,
        }
    }

    /// Whether the final code passes its tests
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Passed { .. })
    }

    /// Whether the pipeline ran to completion (pass or fail)
    pub fn completed(&self) -> bool {
        matches!(self, RunOutcome::Passed { .. } | RunOutcome::Failed)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Passed { fixed: false } => write!(f, "tests passed"),
            RunOutcome::Passed { fixed: true } => write!(f, "tests passed after one fix"),
            RunOutcome::Failed => write!(f, "tests still failing after one fix"),
            RunOutcome::Aborted { phase, reason } => {
                write!(f, "aborted while {}: {}", phase.description().to_lowercase(), reason)
            }
            RunOutcome::Cancelled { phase } => {
                write!(f, "cancelled before {}", phase.description().to_lowercase())
            }
        }
    }
}
