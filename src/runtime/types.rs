// Core types exchanged between the validator and an agent runtime

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

/// One action taken by the agent while working on an instruction
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    /// Action name (e.g., "click_element", "mobile_tap")
    pub action: String,

    /// Action parameters, in the order the agent produced them
    pub params: Vec<(String, serde_json::Value)>,

    /// The agent's rationale for this step, if exposed
    pub thoughts: Option<String>,

    /// Location active while the step ran
    pub url: Option<String>,

    /// How long the step took
    pub duration: Option<Duration>,

    /// Screenshot after the step, base64 encoded
    pub screenshot: Option<String>,
}

impl StepEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Vec::new(),
            thoughts: None,
            url: None,
            duration: None,
            screenshot: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn thoughts(mut self, thoughts: impl Into<String>) -> Self {
        self.thoughts = Some(thoughts.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn screenshot(mut self, encoded: impl Into<String>) -> Self {
        self.screenshot = Some(encoded.into());
        self
    }
}

/// Lifecycle signal from the agent runtime that is not an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    NodeStart { node: String },
    NodeEnd { node: String },
    ToolStart { name: String, input: String },
    ToolEnd { name: String, output: String },
    ModelEnd { content: String },
}

impl AgentEvent {
    /// Short label used when attaching the event
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::NodeStart { .. } => "Node Start",
            AgentEvent::NodeEnd { .. } => "Node End",
            AgentEvent::ToolStart { .. } => "Tool Start",
            AgentEvent::ToolEnd { .. } => "Tool End",
            AgentEvent::ModelEnd { .. } => "Model End",
        }
    }

    /// One-line rendering for logs
    pub fn describe(&self) -> String {
        match self {
            AgentEvent::NodeStart { node } => format!("[NODE:START] {}", node),
            AgentEvent::NodeEnd { node } => format!("[NODE:END] {}", node),
            AgentEvent::ToolStart { name, input } => format!("[TOOL:START] {} args={}", name, input),
            AgentEvent::ToolEnd { name, output } => format!("[TOOL:END] {} output={}", name, output),
            AgentEvent::ModelEnd { content } => format!("[MODEL:END] {}", content),
        }
    }
}

/// Item streamed from a runtime while an instruction executes
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Step(StepEvent),
    Trace(AgentEvent),
}

/// Channel end handed to a runtime for streaming events
pub type EventSender = mpsc::UnboundedSender<RuntimeEvent>;

/// Receiving end drained by the validator
pub type EventReceiver = mpsc::UnboundedReceiver<RuntimeEvent>;

/// Descriptive information about a runtime, used for environment reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// Runtime name (e.g., "browser-use", "LangGraph ReAct Agent")
    pub name: String,
    /// Runtime version, if known
    pub version: Option<String>,
    /// Automation library driving the target (e.g., "playwright 1.52", "mobile-mcp + Appium")
    pub automation: Option<String>,
    /// Target platform (e.g., "Android", "Web")
    pub platform: Option<String>,
    /// Browser type, for web targets
    pub browser: Option<String>,
}

impl RuntimeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn automation(mut self, automation: impl Into<String>) -> Self {
        self.automation = Some(automation.into());
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }
}

/// Result type for runtime operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors raised by an agent runtime
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent process could not be spawned or exited abnormally
    #[error("Process error: {0}")]
    Process(String),

    /// The runtime produced output that does not follow the bridge protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The runtime reported a failure of its own
    #[error("Agent execution failed: {0}")]
    Execution(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_event_builder_keeps_param_order() {
        let step = StepEvent::new("input_text")
            .param("index", 3)
            .param("text", "rust")
            .param("clear", true);

        let names: Vec<&str> = step.params.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["index", "text", "clear"]);
    }

    #[test]
    fn test_agent_event_describe() {
        let event = AgentEvent::ToolStart {
            name: "mobile_list_available_devices".to_string(),
            input: "{}".to_string(),
        };
        assert_eq!(event.kind(), "Tool Start");
        assert_eq!(event.describe(), "[TOOL:START] mobile_list_available_devices args={}");

        let event = AgentEvent::ModelEnd {
            content: "done".to_string(),
        };
        assert_eq!(event.describe(), "[MODEL:END] done");
    }
}
