//! Agent Harness - natural-language task validation for LLM agents.
//!
//! This crate provides:
//! - A task validator that dispatches instructions to an agent runtime,
//!   enforces a timeout, and checks the final answer
//! - Step-by-step recording of agent actions (thoughts, URL, timing, screenshot)
//! - Allure-compatible result files, including the session environment
//! - Runtime adapters: a scripted in-process runtime and a JSON-lines process bridge
//! - Direct device probes for screenshots and accessibility trees
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agent_harness::{
//!     AllureSink, Config, ProcessRuntime, SessionContext, TaskRequest, TaskValidator,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env().with_base_url("https://discuss.google.dev/");
//! let runtime = Arc::new(ProcessRuntime::for_program("./agents/browser_agent.py"));
//! let sink = Arc::new(AllureSink::new(&config.report.results_dir)?);
//! let session = SessionContext::initialize(config, runtime.as_ref()).await;
//!
//! let validator = TaskValidator::new(runtime, sink, session);
//! let text = validator
//!     .validate(TaskRequest::new("search for 'Looker'").expect("looker").ignore_case(true))
//!     .await?;
//! println!("{}", text);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod environment;
pub mod harness;
pub mod recorder;
pub mod report;
pub mod runner;
pub mod runtime;
pub mod session;
pub mod validator;

// Re-export configuration
pub use config::Config;

// Re-export runner types
pub use runner::{CaseOutcome, RunResult};

// Re-export harness types
pub use harness::{CaseConfig, HarnessError, HarnessResult, SuiteConfig, run_suite};

// Re-export runtimes and probes
pub use runtime::{
    AdbProbe, AgentError, AgentEvent, AgentResult, AgentRuntime, DeviceProbe, EventSender,
    ProbeError, ProcessRuntime, ProcessRuntimeConfig, RuntimeEvent, RuntimeInfo, Script,
    ScriptedRuntime, StepEvent,
};

// Re-export reporting
pub use report::{
    AllureSink, Attachment, AttachmentKind, MemorySink, ReportError, ReportSink, Status,
    StatusDetails,
};

// Re-export session, environment and recording
pub use environment::{EnvironmentDescriptor, EnvironmentReporter};
pub use recorder::{EventLog, StepRecorder};
pub use session::{DeviceContext, SessionContext};

// Re-export the validator
pub use validator::{TaskRequest, TaskValidator, ValidationError, ValidationResult};
