//! Generate → review → test pipeline with a single self-healing retry
//!
//! The pipeline:
//! 1. Generate code for the task
//! 2. Have the senior reviewer role critique it (informational only)
//! 3. Run the tests
//! 4. If they fail: ask the debugger role for an analysis, generate a fix
//!    from it, and run the tests once more
//!
//! Every executed step appends exactly one report entry. There is never more
//! than one debug/fix/retest cycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::GenerationAgent;
use crate::report::Report;
use crate::review::{ReviewAgent, DEBUGGER_ROLE, SENIOR_REVIEWER_ROLE};
use crate::test_runner::{TestResult, TestRunner};
use crate::{Error, Result};

use super::state::{Phase, RunOutcome, WorkflowState};

/// Report entry titles, in execution order
pub mod titles {
    pub const GENERATION: &str = "Initial code generation";
    pub const REVIEW: &str = "Code review feedback";
    pub const FIRST_TEST: &str = "Initial test result";
    pub const ANALYSIS: &str = "Error analysis";
    pub const FIX: &str = "Final fix";
    pub const FINAL_TEST_PASSED: &str = "Final test result: passed";
    pub const FINAL_TEST_FAILED: &str = "Final test result: failed";
    pub const ABORTED: &str = "Run aborted";
    pub const CANCELLED: &str = "Run cancelled";
}

/// Receives a line of progress for each step as it starts
pub trait ProgressSink: Send + Sync {
    fn step(&self, phase: Phase, detail: &str);
}

/// Progress sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn step(&self, _phase: Phase, _detail: &str) {}
}

/// Context handed to the debugger role after a failing test run
pub fn debug_context(test_output: &str, code: &str) -> String {
    format!("Test error log:\n{}\n\nRelated code:\n{}", test_output, code)
}

/// Task handed back to the generation agent to apply a fix
pub fn fix_task(suggestion: &str) -> String {
    format!(
        "Fix the code based on the following analysis and make the tests pass: {}",
        suggestion
    )
}

/// Why the pipeline stopped early
enum Halt {
    /// A collaborator failed or the run was cancelled
    Step(Error),
    /// The report itself could not be written
    Report(Error),
}

/// Drives one run of the pipeline
pub struct Pipeline {
    generator: Arc<dyn GenerationAgent>,
    reviewer: Arc<dyn ReviewAgent>,
    tests: TestRunner,
    report: Report,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressSink>,
    /// Phase being worked towards, for abort reporting
    attempting: Phase,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("generator", &self.generator.name())
            .field("reviewer", &self.reviewer.name())
            .field("tests", &self.tests)
            .field("report", &self.report.path())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline over its collaborators
    pub fn new(
        generator: Arc<dyn GenerationAgent>,
        reviewer: Arc<dyn ReviewAgent>,
        tests: TestRunner,
        report: Report,
    ) -> Self {
        Self {
            generator,
            reviewer,
            tests,
            report,
            cancel: CancellationToken::new(),
            progress: Arc::new(NoProgress),
            attempting: Phase::Init,
        }
    }

    /// Stop between steps once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Report step progress to `sink`
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// The audit report
    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Run the pipeline for `task`
    ///
    /// The report is reset first. Collaborator failures end the run with
    /// [`RunOutcome::Aborted`]; only a failure to write the report is
    /// returned as `Err`, since the run cannot be audited past that point.
    pub async fn run(&mut self, task: &str) -> Result<RunOutcome> {
        self.report.reset()?;
        self.attempting = Phase::Init;
        let mut state = WorkflowState::new(task);

        info!(report = %self.report.path().display(), "Pipeline started");

        let outcome = match self.drive(&mut state).await {
            Ok(outcome) => outcome,
            Err(Halt::Report(e)) => return Err(e),
            Err(Halt::Step(Error::Cancelled)) => {
                let phase = self.attempting;
                warn!(%phase, "Pipeline cancelled");
                self.report
                    .append(titles::CANCELLED, format!("Cancelled before: {}", phase))?;
                RunOutcome::Cancelled { phase }
            }
            Err(Halt::Step(e)) => {
                let phase = self.attempting;
                warn!(%phase, error = %e, "Pipeline aborted");
                self.report
                    .append(titles::ABORTED, format!("{}: {}", phase, e))?;
                RunOutcome::Aborted {
                    phase,
                    reason: e.to_string(),
                }
            }
        };

        info!(outcome = %outcome, "Pipeline finished");
        Ok(outcome)
    }

    async fn drive(&mut self, state: &mut WorkflowState) -> std::result::Result<RunOutcome, Halt> {
        // Init -> Generated
        self.begin(Phase::Generated, state.task())?;
        let code = self
            .generator
            .generate(state.task())
            .await
            .map_err(Halt::Step)?;
        self.report
            .append_with_input(titles::GENERATION, state.task(), code.as_str())
            .map_err(Halt::Report)?;
        state.record_generation(code);
        state.advance(Phase::Generated).map_err(Halt::Step)?;

        // Generated -> Reviewed
        self.begin(Phase::Reviewed, SENIOR_REVIEWER_ROLE)?;
        let review = self
            .reviewer
            .review(SENIOR_REVIEWER_ROLE, state.generated())
            .await
            .map_err(Halt::Step)?;
        self.report
            .append(titles::REVIEW, review)
            .map_err(Halt::Report)?;
        state.advance(Phase::Reviewed).map_err(Halt::Step)?;

        // Reviewed -> Tested
        let first = self.run_tests(state, Phase::Tested).await?;
        self.report
            .append_with_input(titles::FIRST_TEST, self.tests.command(), first.output.as_str())
            .map_err(Halt::Report)?;
        let first_passed = first.success;
        state.record_test(first);
        state.advance(Phase::Tested).map_err(Halt::Step)?;

        if first_passed {
            state.advance(Phase::Done).map_err(Halt::Step)?;
            return Ok(RunOutcome::Passed { fixed: false });
        }

        // Tested -> Debugging
        self.begin(Phase::Debugging, DEBUGGER_ROLE)?;
        let failing_output = state
            .last_test()
            .map(|t| t.output.as_str())
            .unwrap_or_default();
        let context = debug_context(failing_output, state.generated());
        let suggestion = self
            .reviewer
            .review(DEBUGGER_ROLE, &context)
            .await
            .map_err(Halt::Step)?;
        if suggestion.trim().is_empty() {
            warn!("Debugger returned an empty analysis; generating a fix anyway");
        }
        self.report
            .append(titles::ANALYSIS, suggestion.as_str())
            .map_err(Halt::Report)?;
        state.advance(Phase::Debugging).map_err(Halt::Step)?;

        // Debugging -> Fixed
        let task = fix_task(&suggestion);
        self.begin(Phase::Fixed, &task)?;
        let fixed = self.generator.generate(&task).await.map_err(Halt::Step)?;
        if fixed.trim().is_empty() {
            warn!("Fix generation returned no output; re-running tests anyway");
        }
        self.report
            .append(titles::FIX, fixed.as_str())
            .map_err(Halt::Report)?;
        state.record_generation(fixed);
        state.advance(Phase::Fixed).map_err(Halt::Step)?;

        // Fixed -> Retested
        let last = self.run_tests(state, Phase::Retested).await?;
        let (title, body) = if last.success {
            (titles::FINAL_TEST_PASSED, "Passed".to_string())
        } else {
            (titles::FINAL_TEST_FAILED, format!("Failed:\n{}", last.output))
        };
        self.report
            .append_with_input(title, self.tests.command(), body)
            .map_err(Halt::Report)?;
        let passed = last.success;
        state.record_test(last);
        state.advance(Phase::Retested).map_err(Halt::Step)?;

        // Retested -> Done, whatever the result
        state.advance(Phase::Done).map_err(Halt::Step)?;
        Ok(if passed {
            RunOutcome::Passed { fixed: true }
        } else {
            RunOutcome::Failed
        })
    }

    /// Check for cancellation and announce the step about to run
    fn begin(&mut self, phase: Phase, detail: &str) -> std::result::Result<(), Halt> {
        self.attempting = phase;
        if self.cancel.is_cancelled() {
            return Err(Halt::Step(Error::Cancelled));
        }
        info!(%phase, "Pipeline step");
        self.progress.step(phase, detail);
        Ok(())
    }

    async fn run_tests(
        &mut self,
        state: &WorkflowState,
        phase: Phase,
    ) -> std::result::Result<TestResult, Halt> {
        let command = self.tests.command().to_string();
        self.begin(phase, &command)?;
        let result = self.tests.run().await.map_err(Halt::Step)?;
        if !result.success {
            warn!(phase = ?state.phase(), summary = %result.summary(), "Tests failed");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
    use crate::report::REPORT_HEADER;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const MEMO_TASK: &str = "build a memo API with tests";
    const MEMO_CODE: &str = "@app.post(\"/memos\")\ndef create_memo(memo: Memo):\n    return memo\n";
    const MEMO_FAILURE: &str = "AssertionError: expected 201, got 404";

    /// Generation agent that replays scripted responses and records tasks
    struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String>>>,
        tasks: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                tasks: Mutex::new(Vec::new()),
            })
        }

        fn tasks(&self) -> Vec<String> {
            self.tasks.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationAgent for ScriptedGenerator {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, task: &str) -> Result<String> {
            self.tasks.lock().unwrap().push(task.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Other("generator script exhausted".to_string())))
        }
    }

    /// Review agent that answers by role and records every request
    struct ScriptedReviewer {
        calls: Mutex<Vec<(String, String)>>,
        fail_role: Option<&'static str>,
        debug_answer: String,
    }

    impl ScriptedReviewer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_role: None,
                debug_answer: "The POST route is not registered; mount the router.".to_string(),
            })
        }

        fn failing_on(role: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_role: Some(role),
                debug_answer: String::new(),
            })
        }

        fn answering_debug_with(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_role: None,
                debug_answer: answer.to_string(),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn roles(&self) -> Vec<String> {
            self.calls().into_iter().map(|(role, _)| role).collect()
        }
    }

    #[async_trait]
    impl ReviewAgent for ScriptedReviewer {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn review(&self, role: &str, context: &str) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((role.to_string(), context.to_string()));
            if self.fail_role == Some(role) {
                return Err(Error::Service {
                    status: Some(403),
                    message: "quota exhausted".to_string(),
                });
            }
            if role == DEBUGGER_ROLE {
                Ok(self.debug_answer.clone())
            } else {
                Ok("Looks reasonable; validate input lengths.".to_string())
            }
        }
    }

    /// Executor that stands in for the test command
    struct ScriptedTests {
        outputs: Mutex<VecDeque<Result<CommandOutput>>>,
        runs: Mutex<usize>,
    }

    impl ScriptedTests {
        fn new(outputs: Vec<Result<CommandOutput>>) -> Arc<Self> {
            Arc::new(Self {
                outputs: Mutex::new(outputs.into()),
                runs: Mutex::new(0),
            })
        }

        fn runs(&self) -> usize {
            *self.runs.lock().unwrap()
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedTests {
        async fn execute(&self, _spec: &CommandSpec) -> Result<CommandOutput> {
            *self.runs.lock().unwrap() += 1;
            self.outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Other("test script exhausted".to_string())))
        }
    }

    fn pass() -> Result<CommandOutput> {
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "3 passed\n".to_string(),
            ..Default::default()
        })
    }

    fn fail(output: &str) -> Result<CommandOutput> {
        Ok(CommandOutput {
            exit_code: Some(1),
            stdout: output.to_string(),
            ..Default::default()
        })
    }

    struct Harness {
        _dir: TempDir,
        pipeline: Pipeline,
        generator: Arc<ScriptedGenerator>,
        reviewer: Arc<ScriptedReviewer>,
        tests: Arc<ScriptedTests>,
    }

    impl Harness {
        fn new(
            generator: Arc<ScriptedGenerator>,
            reviewer: Arc<ScriptedReviewer>,
            tests: Arc<ScriptedTests>,
        ) -> Self {
            let dir = TempDir::new().unwrap();
            let report = Report::new(dir.path().join("dev_report.md"));
            let runner = TestRunner::new("pytest").with_executor(tests.clone());
            let pipeline = Pipeline::new(generator.clone(), reviewer.clone(), runner, report);
            Self {
                _dir: dir,
                pipeline,
                generator,
                reviewer,
                tests,
            }
        }

        fn titles(&self) -> Vec<String> {
            self.pipeline
                .report()
                .entries()
                .iter()
                .map(|e| e.title.clone())
                .collect()
        }

        fn report_text(&self) -> String {
            std::fs::read_to_string(self.pipeline.report().path()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_passing_tests_skip_debugging() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![Ok(MEMO_CODE.to_string())]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![pass()]),
        );

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        assert_eq!(outcome, RunOutcome::Passed { fixed: false });
        assert_eq!(
            h.titles(),
            vec![titles::GENERATION, titles::REVIEW, titles::FIRST_TEST]
        );
        assert_eq!(h.reviewer.roles(), vec![SENIOR_REVIEWER_ROLE]);
        assert_eq!(h.generator.tasks(), vec![MEMO_TASK]);
        assert_eq!(h.tests.runs(), 1);
    }

    #[tokio::test]
    async fn test_failing_tests_run_one_fix_cycle() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![
                Ok(MEMO_CODE.to_string()),
                Ok("fixed code".to_string()),
            ]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![fail(MEMO_FAILURE), pass()]),
        );

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        assert_eq!(outcome, RunOutcome::Passed { fixed: true });
        assert_eq!(
            h.titles(),
            vec![
                titles::GENERATION,
                titles::REVIEW,
                titles::FIRST_TEST,
                titles::ANALYSIS,
                titles::FIX,
                titles::FINAL_TEST_PASSED,
            ]
        );
        assert_eq!(h.reviewer.roles(), vec![SENIOR_REVIEWER_ROLE, DEBUGGER_ROLE]);
        assert_eq!(h.tests.runs(), 2);

        let tasks = h.generator.tasks();
        assert_eq!(tasks.len(), 2);
        assert!(tasks[1].contains("The POST route is not registered"));
    }

    #[tokio::test]
    async fn test_memo_scenario_still_failing_terminates() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![
                Ok(MEMO_CODE.to_string()),
                Ok("attempted fix".to_string()),
            ]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![fail(MEMO_FAILURE), fail(MEMO_FAILURE)]),
        );

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(h.tests.runs(), 2);

        let calls = h.reviewer.calls();
        let debug_calls: Vec<_> = calls.iter().filter(|(role, _)| role == DEBUGGER_ROLE).collect();
        assert_eq!(debug_calls.len(), 1);
        assert!(debug_calls[0].1.contains(MEMO_FAILURE));
        assert!(debug_calls[0].1.contains(MEMO_CODE));

        let entries = h.pipeline.report().entries();
        let last = entries.last().unwrap();
        assert_eq!(last.title, titles::FINAL_TEST_FAILED);
        assert_eq!(last.body, format!("Failed:\n{}", MEMO_FAILURE));
    }

    #[tokio::test]
    async fn test_generated_code_reaches_reviewer_verbatim() {
        let code = "fn f() {\r\n\t`weird` \"quotes\" $(x) ünïcode\n}\n\n";
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![Ok(code.to_string())]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![pass()]),
        );

        h.pipeline.run("task").await.unwrap();

        let calls = h.reviewer.calls();
        assert_eq!(calls[0], (SENIOR_REVIEWER_ROLE.to_string(), code.to_string()));
    }

    #[tokio::test]
    async fn test_second_run_replaces_first() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![
                Ok("first run code".to_string()),
                Ok("second run code".to_string()),
            ]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![pass(), pass()]),
        );

        h.pipeline.run("first task").await.unwrap();
        h.pipeline.run("second task").await.unwrap();

        let text = h.report_text();
        assert!(text.starts_with(REPORT_HEADER));
        assert!(!text.contains("first task"));
        assert!(!text.contains("first run code"));
        assert!(text.contains("second run code"));
        assert_eq!(text.matches("## ").count(), 3);
        assert_eq!(h.pipeline.report().entries().len(), 3);
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_before_review() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![Err(Error::AgentInvocation {
                status: "exit code 1".to_string(),
                stderr: "not logged in".to_string(),
            })]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![]),
        );

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        match outcome {
            RunOutcome::Aborted { phase, ref reason } => {
                assert_eq!(phase, Phase::Generated);
                assert!(reason.contains("not logged in"));
            }
            ref other => panic!("expected Aborted, got {:?}", other),
        }
        assert_eq!(outcome.exit_code(), 2);
        assert!(h.reviewer.calls().is_empty());
        assert_eq!(h.tests.runs(), 0);
        assert_eq!(h.titles(), vec![titles::ABORTED]);
    }

    #[tokio::test]
    async fn test_review_service_failure_leaves_partial_trail() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![Ok(MEMO_CODE.to_string())]),
            ScriptedReviewer::failing_on(SENIOR_REVIEWER_ROLE),
            ScriptedTests::new(vec![]),
        );

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Aborted { phase: Phase::Reviewed, .. }));
        assert_eq!(h.titles(), vec![titles::GENERATION, titles::ABORTED]);
        assert_eq!(h.tests.runs(), 0);
    }

    #[tokio::test]
    async fn test_test_infrastructure_failure_aborts() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![Ok(MEMO_CODE.to_string())]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![Ok(CommandOutput {
                exit_code: Some(127),
                stderr: "sh: pytest: not found".to_string(),
                ..Default::default()
            })]),
        );

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Aborted { phase: Phase::Tested, .. }));
        assert_eq!(h.reviewer.roles(), vec![SENIOR_REVIEWER_ROLE]);
    }

    #[tokio::test]
    async fn test_empty_analysis_still_retests() {
        let mut h = Harness::new(
            ScriptedGenerator::new(vec![Ok(MEMO_CODE.to_string()), Ok(String::new())]),
            ScriptedReviewer::answering_debug_with(""),
            ScriptedTests::new(vec![fail(MEMO_FAILURE), fail(MEMO_FAILURE)]),
        );

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        assert_eq!(outcome, RunOutcome::Failed);
        assert_eq!(h.tests.runs(), 2);
        assert_eq!(h.titles().len(), 6);
    }

    #[tokio::test]
    async fn test_cancelled_run_invokes_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let mut h = Harness::new(
            ScriptedGenerator::new(vec![Ok(MEMO_CODE.to_string())]),
            ScriptedReviewer::new(),
            ScriptedTests::new(vec![pass()]),
        );
        h.pipeline = h.pipeline.with_cancellation(token);

        let outcome = h.pipeline.run(MEMO_TASK).await.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled { phase: Phase::Generated });
        assert!(h.generator.tasks().is_empty());
        assert_eq!(h.titles(), vec![titles::CANCELLED]);
    }

    #[tokio::test]
    async fn test_unwritable_report_is_fatal_before_any_step() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("dev_report.md");
        std::fs::create_dir(&report_path).unwrap();

        let generator = ScriptedGenerator::new(vec![Ok(MEMO_CODE.to_string())]);
        let tests = ScriptedTests::new(vec![pass()]);
        let mut pipeline = Pipeline::new(
            generator.clone(),
            ScriptedReviewer::new(),
            TestRunner::new("pytest").with_executor(tests),
            Report::new(report_path),
        );

        let result = pipeline.run(MEMO_TASK).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(generator.tasks().is_empty());
    }

    #[test]
    fn test_debug_context_layout() {
        let context = debug_context("E   assert 404 == 201", "def f(): pass");
        assert_eq!(
            context,
            "Test error log:\nE   assert 404 == 201\n\nRelated code:\ndef f(): pass"
        );
    }
}
