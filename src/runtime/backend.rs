//! Agent runtime abstraction.
//!
//! This module provides a unified interface for the agents that execute
//! natural-language instructions:
//! - `ProcessRuntime` bridges to an external agent process (see `process`)
//! - `ScriptedRuntime` replays pre-programmed outcomes (testing and demos)

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::types::{
    AgentError, AgentEvent, AgentResult, EventSender, RuntimeEvent, RuntimeInfo, StepEvent,
};

/// Trait for agent runtimes
///
/// `execute` runs one instruction to completion. Steps and trace events are
/// streamed through `events` while the instruction runs; the returned value is
/// the agent's final text, or `None` when the agent did not converge.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Execute a single instruction
    async fn execute(&self, instruction: &str, events: EventSender) -> AgentResult<Option<String>>;

    /// Describe this runtime for the environment report
    fn info(&self) -> RuntimeInfo;

    /// Discover the device this runtime drives, if any.
    ///
    /// Called at most once per session.
    async fn resolve_device(&self) -> AgentResult<Option<String>> {
        Ok(None)
    }
}

/// Pre-programmed outcome for instructions matching a pattern
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Trace events emitted before the steps
    pub traces: Vec<AgentEvent>,
    /// Steps emitted in order
    pub steps: Vec<StepEvent>,
    /// Delay after the steps are emitted, before returning
    pub delay: Option<Duration>,
    /// Final text returned (None means the agent did not converge)
    pub result: Option<String>,
    /// Runtime failure returned instead of a result
    pub failure: Option<String>,
}

impl Script {
    /// Script that returns the given text
    pub fn returning(text: impl Into<String>) -> Self {
        Self {
            result: Some(text.into()),
            ..Default::default()
        }
    }

    /// Script that never produces a final result
    pub fn no_result() -> Self {
        Self::default()
    }

    /// Script that fails inside the runtime
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn step(mut self, step: StepEvent) -> Self {
        self.steps.push(step);
        self
    }

    pub fn trace(mut self, event: AgentEvent) -> Self {
        self.traces.push(event);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Deterministic in-process runtime
///
/// Instructions are matched against registered patterns by substring, first
/// match wins; unmatched instructions use the fallback script. Every
/// dispatched instruction is recorded for later inspection.
pub struct ScriptedRuntime {
    scripts: Vec<(String, Script)>,
    fallback: Script,
    device: Option<String>,
    info: RuntimeInfo,
    dispatched: Mutex<Vec<String>>,
    device_queries: Mutex<usize>,
}

impl ScriptedRuntime {
    /// Create a runtime whose fallback returns no result
    pub fn new() -> Self {
        Self {
            scripts: Vec::new(),
            fallback: Script::no_result(),
            device: None,
            info: RuntimeInfo::new("scripted").version(env!("CARGO_PKG_VERSION")),
            dispatched: Mutex::new(Vec::new()),
            device_queries: Mutex::new(0),
        }
    }

    /// Register a script for instructions containing `pattern`
    pub fn on(mut self, pattern: impl Into<String>, script: Script) -> Self {
        self.scripts.push((pattern.into(), script));
        self
    }

    /// Script used when no pattern matches
    pub fn otherwise(mut self, script: Script) -> Self {
        self.fallback = script;
        self
    }

    /// Device reported by `resolve_device`
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device = Some(device_id.into());
        self
    }

    pub fn with_info(mut self, info: RuntimeInfo) -> Self {
        self.info = info;
        self
    }

    /// Instructions executed so far, in dispatch order
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().clone()
    }

    /// Number of times device discovery was requested
    pub fn device_queries(&self) -> usize {
        *self.device_queries.lock()
    }

    fn script_for(&self, instruction: &str) -> &Script {
        self.scripts
            .iter()
            .find(|(pattern, _)| instruction.contains(pattern.as_str()))
            .map(|(_, script)| script)
            .unwrap_or(&self.fallback)
    }
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn execute(&self, instruction: &str, events: EventSender) -> AgentResult<Option<String>> {
        self.dispatched.lock().push(instruction.to_string());
        let script = self.script_for(instruction).clone();

        // A closed receiver only means nobody is recording
        for trace in script.traces {
            let _ = events.send(RuntimeEvent::Trace(trace));
        }
        for step in script.steps {
            let _ = events.send(RuntimeEvent::Step(step));
        }

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        match script.failure {
            Some(message) => Err(AgentError::Execution(message)),
            None => Ok(script.result),
        }
    }

    fn info(&self) -> RuntimeInfo {
        self.info.clone()
    }

    async fn resolve_device(&self) -> AgentResult<Option<String>> {
        *self.device_queries.lock() += 1;
        Ok(self.device.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_scripted_runtime_matches_first_pattern() {
        let runtime = ScriptedRuntime::new()
            .on("login", Script::returning("Welcome"))
            .on("log", Script::returning("never reached"))
            .otherwise(Script::returning("fallback"));

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = runtime.execute("please login", tx.clone()).await.unwrap();
        assert_eq!(result.as_deref(), Some("Welcome"));

        let result = runtime.execute("something else", tx).await.unwrap();
        assert_eq!(result.as_deref(), Some("fallback"));

        assert_eq!(runtime.dispatched(), vec!["please login", "something else"]);
    }

    #[tokio::test]
    async fn test_scripted_runtime_streams_traces_then_steps() {
        let runtime = ScriptedRuntime::new().otherwise(
            Script::returning("ok")
                .step(StepEvent::new("go_to_url").param("url", "https://example.com"))
                .trace(AgentEvent::NodeStart {
                    node: "agent".to_string(),
                }),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        runtime.execute("task", tx).await.unwrap();

        assert!(matches!(rx.recv().await, Some(RuntimeEvent::Trace(_))));
        assert!(matches!(rx.recv().await, Some(RuntimeEvent::Step(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_scripted_runtime_failure() {
        let runtime = ScriptedRuntime::new().otherwise(Script::failing("browser crashed"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = runtime.execute("task", tx).await.unwrap_err();
        assert!(matches!(err, AgentError::Execution(ref m) if m == "browser crashed"));
    }
}
