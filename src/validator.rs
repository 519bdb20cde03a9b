//! Task validation.
//!
//! `TaskValidator` hands natural-language instructions to an agent runtime,
//! records what the agent did while it works, and checks the final text:
//!
//! 1. preconditions run first, in order, and must each produce a result
//! 2. the main instruction runs under the same timeout
//! 3. the result must exist and, if requested, contain the expected text
//!
//! Every dispatch is grouped under its own report step together with the
//! agent's steps, trace events, captures and the final output. Reporting is
//! best-effort and never changes the verdict.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

use crate::environment::EnvironmentReporter;
use crate::recorder::{EventLog, StepRecorder, image_attachment};
use crate::report::{Attachment, ReportSink, Status};
use crate::runtime::{
    AgentError, AgentResult, AgentRuntime, DeviceProbe, ProbeError, RuntimeEvent, with_timeout,
};
use crate::session::SessionContext;

pub const FINAL_OUTPUT_ATTACHMENT: &str = "Agent Final Output";
pub const EXECUTION_ERROR_ATTACHMENT: &str = "Execution Error";
pub const TIMEOUT_ERROR_ATTACHMENT: &str = "Timeout Error";
pub const EXECUTION_SUMMARY_ATTACHMENT: &str = "Execution Summary";
pub const PERFORMANCE_WARNING_ATTACHMENT: &str = "Performance Warning";
pub const RESPONSE_LENGTH_WARNING_ATTACHMENT: &str = "Response Length Warning";
pub const SCREENSHOT_WARNING_ATTACHMENT: &str = "Screenshot Warning";
pub const ERROR_STATE_SCREENSHOT: &str = "Error State";

/// Results shorter than this (trimmed) get a length warning
pub const SHORT_RESPONSE_CHARS: usize = 20;

/// Keywords that usually mean the agent gave up, checked in this order
pub const FAILURE_INDICATORS: &[&str] = &[
    "failed",
    "error",
    "cannot",
    "unable",
    "not found",
    "timed out",
    "aborted",
    "unsuccessful",
    "could not",
];

/// Result type for validation
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Why a task did not validate
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The instruction was empty or whitespace
    #[error("Task instruction must not be empty")]
    EmptyInstruction,

    /// The runtime finished without a final text
    #[error("Agent returned no result for task: {instruction}")]
    MissingResult { instruction: String },

    /// The final text lacks the expected substring
    #[error("Expected '{expected}' not found in agent result: '{actual}'")]
    AssertionMismatch {
        expected: String,
        actual: String,
        /// First failure keyword found in the result, for diagnostics only
        indicator: Option<String>,
    },

    /// The dispatch did not finish within the timeout
    #[error("Task execution timed out after {timeout:?}: {instruction}")]
    TaskTimeout {
        instruction: String,
        timeout: Duration,
    },

    /// The runtime itself failed
    #[error(transparent)]
    Runtime(#[from] AgentError),
}

impl ValidationError {
    /// Report status for this error: a wrong or missing answer fails the
    /// test, anything else breaks it
    pub fn status(&self) -> Status {
        match self {
            ValidationError::MissingResult { .. } | ValidationError::AssertionMismatch { .. } => {
                Status::Failed
            }
            _ => Status::Broken,
        }
    }
}

/// One validation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRequest {
    pub instruction: String,
    pub expected_substring: Option<String>,
    pub ignore_case: bool,
    pub preconditions: Vec<String>,
}

impl TaskRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn expect(mut self, substring: impl Into<String>) -> Self {
        self.expected_substring = Some(substring.into());
        self
    }

    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    pub fn precondition(mut self, instruction: impl Into<String>) -> Self {
        self.preconditions.push(instruction.into());
        self
    }

    pub fn preconditions<I, S>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preconditions
            .extend(instructions.into_iter().map(Into::into));
        self
    }
}

/// Dispatches instructions to an agent runtime and validates the outcome
pub struct TaskValidator {
    runtime: Arc<dyn AgentRuntime>,
    sink: Arc<dyn ReportSink>,
    session: Arc<SessionContext>,
    probe: Option<Arc<dyn DeviceProbe>>,
    recorder: StepRecorder,
    timeout: Duration,
    capture_timeout: Duration,
    slow_task_threshold: Duration,
}

impl TaskValidator {
    /// Create a validator for one session.
    ///
    /// Writes the session environment to the sink if this session has not
    /// done so yet.
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        sink: Arc<dyn ReportSink>,
        session: Arc<SessionContext>,
    ) -> Self {
        EnvironmentReporter::report(&session, sink.as_ref());

        let agent = &session.config().agent;
        let timeout = agent.task_timeout();
        let capture_timeout = agent.capture_timeout();
        let slow_task_threshold = agent.slow_task_threshold();

        Self {
            recorder: StepRecorder::new(sink.clone()).capture_timeout(capture_timeout),
            runtime,
            sink,
            session,
            probe: None,
            timeout,
            capture_timeout,
            slow_task_threshold,
        }
    }

    /// Probe for pre-/post-task captures and step screenshot fallback
    pub fn with_probe(mut self, probe: Arc<dyn DeviceProbe>) -> Self {
        self.recorder = self.recorder.with_probe(probe.clone());
        self.probe = Some(probe);
        self
    }

    /// Override the per-dispatch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_slow_task_threshold(mut self, threshold: Duration) -> Self {
        self.slow_task_threshold = threshold;
        self
    }

    pub fn sink(&self) -> &Arc<dyn ReportSink> {
        &self.sink
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validate a single instruction with no preconditions
    pub async fn validate_task(
        &self,
        instruction: &str,
        expected_substring: Option<&str>,
        ignore_case: bool,
    ) -> ValidationResult<String> {
        let mut request = TaskRequest::new(instruction).ignore_case(ignore_case);
        request.expected_substring = expected_substring.map(str::to_string);
        self.validate(request).await
    }

    /// Run preconditions and the main instruction, then check the result.
    ///
    /// Returns the raw result text of the main instruction.
    pub async fn validate(&self, request: TaskRequest) -> ValidationResult<String> {
        if request.instruction.trim().is_empty() {
            return Err(ValidationError::EmptyInstruction);
        }

        for (index, precondition) in request.preconditions.iter().enumerate() {
            info!(index, precondition = %precondition, "running precondition");
            let composed = self.session.compose_precondition(precondition);
            self.dispatch(precondition, &composed).await?;
        }

        let composed = self.session.compose_instruction(&request.instruction);
        let result = self.dispatch(&request.instruction, &composed).await?;

        if let Some(expected) = request
            .expected_substring
            .as_deref()
            .filter(|e| !e.is_empty())
        {
            if !contains_expected(&result, expected, request.ignore_case) {
                let indicator = failure_indicator(&result).map(str::to_string);
                warn!(
                    expected = %expected,
                    indicator = ?indicator,
                    "expected text not found in agent result"
                );
                return Err(ValidationError::AssertionMismatch {
                    expected: expected.to_string(),
                    actual: result,
                    indicator,
                });
            }
        }

        info!(instruction = %request.instruction, "task validated");
        Ok(result)
    }

    /// Run one instruction inside its own report step
    async fn dispatch(&self, instruction: &str, composed: &str) -> ValidationResult<String> {
        self.sink
            .start_step(&format!("Running agent with task: {}", instruction));
        let outcome = self.execute_recorded(instruction, composed).await;
        let status = match &outcome {
            Ok(_) => Status::Passed,
            Err(err) => err.status(),
        };
        self.sink.stop_step(status);
        outcome
    }

    async fn execute_recorded(&self, instruction: &str, composed: &str) -> ValidationResult<String> {
        self.capture_screenshot(&format!("Pre-task: {}", instruction), true)
            .await;

        info!(task = %composed, timeout = ?self.timeout, "dispatching to agent");
        let started = Instant::now();
        let mut log = EventLog::new(self.sink.clone());
        let outcome = self.run_and_record(composed, &mut log).await;
        let elapsed = started.elapsed();
        log.attach_complete_log();

        let result = match outcome {
            Ok(Ok(Some(text))) => text,
            Ok(Ok(None)) => {
                let err = ValidationError::MissingResult {
                    instruction: instruction.to_string(),
                };
                self.attach_failure(EXECUTION_ERROR_ATTACHMENT, err.to_string())
                    .await;
                return Err(err);
            }
            Ok(Err(err)) => {
                self.attach_failure(
                    EXECUTION_ERROR_ATTACHMENT,
                    format!("Task execution failed: {}", err),
                )
                .await;
                return Err(err.into());
            }
            Err(_) => {
                self.attach_failure(
                    TIMEOUT_ERROR_ATTACHMENT,
                    format!(
                        "Task execution timed out after {} seconds",
                        self.timeout.as_secs_f64()
                    ),
                )
                .await;
                return Err(ValidationError::TaskTimeout {
                    instruction: instruction.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        info!(elapsed = ?elapsed, chars = result.chars().count(), "agent finished");
        self.attach_result(instruction, &result, elapsed);
        self.capture_screenshot(&format!("Post-task: {}", instruction), false)
            .await;
        self.capture_accessibility_tree(instruction).await;
        Ok(result)
    }

    /// Execute under the timeout while draining events as they arrive.
    ///
    /// The sender is owned by the execution future, so the drain ends when
    /// the runtime returns or is cancelled; events emitted before a timeout
    /// are still recorded.
    async fn run_and_record(
        &self,
        composed: &str,
        log: &mut EventLog,
    ) -> Result<AgentResult<Option<String>>, Elapsed> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let execution = tokio::time::timeout(self.timeout, self.runtime.execute(composed, tx));
        let drain = async {
            let mut steps = 0usize;
            while let Some(event) = rx.recv().await {
                match event {
                    RuntimeEvent::Step(step) => {
                        self.recorder.record(&step).await;
                        steps += 1;
                    }
                    RuntimeEvent::Trace(trace) => log.dispatch(&trace),
                }
            }
            steps
        };

        let (outcome, steps) = tokio::join!(execution, drain);
        debug!(steps, traces = log.len(), "event stream closed");
        outcome
    }

    fn attach_result(&self, instruction: &str, result: &str, elapsed: Duration) {
        self.sink.attach(Attachment::text(
            FINAL_OUTPUT_ATTACHMENT,
            format!("Task: {}\n\n{}", instruction, result),
        ));

        if result.trim().chars().count() < SHORT_RESPONSE_CHARS {
            self.sink.attach(Attachment::text(
                RESPONSE_LENGTH_WARNING_ATTACHMENT,
                format!(
                    "Warning: Very short response may indicate incomplete execution: '{}'",
                    result
                ),
            ));
        }

        if elapsed > self.slow_task_threshold {
            warn!(elapsed = ?elapsed, "task exceeded performance threshold");
            self.sink.attach(Attachment::text(
                PERFORMANCE_WARNING_ATTACHMENT,
                format!(
                    "Task execution took {:.1}s (target: <{}s)\nTask: {}",
                    elapsed.as_secs_f64(),
                    self.slow_task_threshold.as_secs(),
                    instruction
                ),
            ));
        }

        self.sink.attach(Attachment::text(
            EXECUTION_SUMMARY_ATTACHMENT,
            format!(
                "Task: {}\nDuration: {:.2} seconds\nResult Length: {} characters",
                instruction,
                elapsed.as_secs_f64(),
                result.chars().count()
            ),
        ));
    }

    async fn attach_failure(&self, name: &str, message: String) {
        warn!(error = %message, "{}", name);
        self.sink.attach(Attachment::text(name, message));
        self.capture_screenshot(ERROR_STATE_SCREENSHOT, false).await;
    }

    async fn capture_screenshot(&self, name: &str, warn_on_failure: bool) {
        let Some(probe) = &self.probe else {
            return;
        };
        match with_timeout(self.capture_timeout, probe.screenshot()).await {
            Ok(bytes) => self.sink.attach(image_attachment(name, bytes)),
            Err(ProbeError::Unsupported(_)) => {}
            Err(err) => {
                warn!(capture = %name, error = %err, "screenshot capture failed");
                if warn_on_failure {
                    self.sink.attach(Attachment::text(
                        SCREENSHOT_WARNING_ATTACHMENT,
                        format!("Failed to capture screenshot ({}): {}", name, err),
                    ));
                }
            }
        }
    }

    async fn capture_accessibility_tree(&self, instruction: &str) {
        let Some(probe) = &self.probe else {
            return;
        };
        let label = truncate(instruction, 30);
        match with_timeout(self.capture_timeout, probe.accessibility_tree()).await {
            Ok(tree) if tree.trim().is_empty() => self.sink.attach(Attachment::text(
                format!("Accessibility Tree Empty - {}", label),
                "Accessibility tree capture returned no content",
            )),
            Ok(tree) => self
                .sink
                .attach(Attachment::text(format!("Accessibility Tree - {}", label), tree)),
            Err(ProbeError::Unsupported(_)) => {}
            Err(err) => {
                warn!(error = %err, "accessibility tree capture failed");
                self.sink.attach(Attachment::text(
                    format!("Accessibility Tree Error - {}", label),
                    err.to_string(),
                ));
            }
        }
    }
}

/// Substring check. An empty expectation always matches.
///
/// With `ignore_case`, both sides are lower-cased and underscores read as
/// spaces, so a token like `NO_RESULTS_FOUND` matches "No results found".
/// This is wider than plain lower-casing: an expected `foo_bar` also matches
/// a result containing "foo bar". Case-sensitive matching is an exact
/// substring test.
pub fn contains_expected(result: &str, expected: &str, ignore_case: bool) -> bool {
    if expected.is_empty() {
        return true;
    }
    if ignore_case {
        normalize(result).contains(&normalize(expected))
    } else {
        result.contains(expected)
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace('_', " ")
}

/// First failure keyword present in `result`, case-insensitive
pub fn failure_indicator(result: &str) -> Option<&'static str> {
    let lower = result.to_lowercase();
    FAILURE_INDICATORS
        .iter()
        .copied()
        .find(|indicator| lower.contains(indicator))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
