//! External agent process bridge with streaming support.
//!
//! Runs an agent implemented outside this crate (a browser-use script, a
//! LangGraph ReAct agent, ...) as a child process and talks to it over stdio:
//!
//! - stdin receives one JSON line: `{"instruction": "..."}`
//! - stdout streams JSON lines, one message each:
//!   - `{"type": "step", "action": "click", "params": {...}, "thoughts": "...",
//!     "url": "...", "duration_secs": 1.2, "screenshot": "<base64>"}`
//!   - `{"type": "trace", "event": "tool_start", "name": "...", "input": ...}`
//!   - `{"type": "final", "text": "..."}` (or `null` when the agent gave up)
//!
//! Lines that are not protocol messages (agent chatter, debug prints) are
//! logged and skipped.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::backend::AgentRuntime;
use super::types::{
    AgentError, AgentEvent, AgentResult, EventSender, RuntimeEvent, RuntimeInfo, StepEvent,
};

/// Configuration for the process bridge
#[derive(Debug, Clone)]
pub struct ProcessRuntimeConfig {
    /// Agent program to execute
    pub program: PathBuf,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Extra environment for the child
    pub env: Vec<(String, String)>,
    /// Reported runtime information
    pub info: RuntimeInfo,
}

impl ProcessRuntimeConfig {
    /// Create a bridge config for the given program
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "agent".to_string());
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            info: RuntimeInfo::new(name),
        }
    }

    /// Add an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn info(mut self, info: RuntimeInfo) -> Self {
        self.info = info;
        self
    }
}

/// Agent runtime backed by a child process
///
/// The child is killed if the dispatch future is dropped (e.g. on timeout).
pub struct ProcessRuntime {
    config: ProcessRuntimeConfig,
}

impl ProcessRuntime {
    pub fn new(config: ProcessRuntimeConfig) -> Self {
        Self { config }
    }

    /// Create a bridge for the given program path
    pub fn for_program(program: impl Into<PathBuf>) -> Self {
        Self::new(ProcessRuntimeConfig::new(program))
    }
}

#[async_trait]
impl AgentRuntime for ProcessRuntime {
    async fn execute(&self, instruction: &str, events: EventSender) -> AgentResult<Option<String>> {
        let program = self.config.program.display().to_string();
        info!(program = %program, "spawning agent process");

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .envs(self.config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Process(format!("Failed to spawn '{}': {}", program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Process("Failed to capture stdin".to_string()))?;
        let request = serde_json::json!({ "instruction": instruction });
        stdin.write_all(format!("{}\n", request).as_bytes()).await?;
        stdin.flush().await?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Process("Failed to capture stdout".to_string()))?;
        let mut segments = BufReader::new(stdout).split(b'\n');

        let mut final_text: Option<Option<String>> = None;
        while let Some(raw) = segments.next_segment().await? {
            let line = decode_line(&raw);
            match parse_line(&line) {
                Some(BridgeMessage::Step(step)) => {
                    let _ = events.send(RuntimeEvent::Step(step.into_event()));
                }
                Some(BridgeMessage::Trace(trace)) => match trace.into_event() {
                    Some(event) => {
                        let _ = events.send(RuntimeEvent::Trace(event));
                    }
                    None => debug!(line = %line, "ignoring unknown trace event"),
                },
                Some(BridgeMessage::Final { text }) => final_text = Some(text),
                None => debug!(line = %line, "agent output"),
            }
        }

        let status = child.wait().await?;
        match final_text {
            Some(text) => Ok(text),
            None if !status.success() => Err(AgentError::Process(format!(
                "'{}' exited with {} before reporting a result",
                program, status
            ))),
            None => Ok(None),
        }
    }

    fn info(&self) -> RuntimeInfo {
        self.config.info.clone()
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeMessage {
    Step(WireStep),
    Trace(WireTrace),
    Final { text: Option<String> },
}

#[derive(Debug, Deserialize)]
struct WireStep {
    action: String,
    #[serde(default)]
    params: serde_json::Map<String, serde_json::Value>,
    thoughts: Option<String>,
    url: Option<String>,
    duration_secs: Option<f64>,
    screenshot: Option<String>,
}

impl WireStep {
    fn into_event(self) -> StepEvent {
        StepEvent {
            action: self.action,
            params: self.params.into_iter().collect(),
            thoughts: self.thoughts,
            url: self.url,
            duration: self
                .duration_secs
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            screenshot: self.screenshot,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireTrace {
    event: String,
    name: Option<String>,
    input: Option<serde_json::Value>,
    output: Option<serde_json::Value>,
    content: Option<String>,
}

impl WireTrace {
    fn into_event(self) -> Option<AgentEvent> {
        let name = |fallback: &str| self.name.clone().unwrap_or_else(|| fallback.to_string());
        let event = match self.event.as_str() {
            "node_start" => AgentEvent::NodeStart { node: name("<node>") },
            "node_end" => AgentEvent::NodeEnd { node: name("<node>") },
            "tool_start" => AgentEvent::ToolStart {
                name: name("<tool>"),
                input: render_value(self.input.as_ref()),
            },
            "tool_end" => AgentEvent::ToolEnd {
                name: name("<tool>"),
                output: render_value(self.output.as_ref()),
            },
            "model_end" => AgentEvent::ModelEnd {
                content: self.content.clone().unwrap_or_default(),
            },
            _ => return None,
        };
        Some(event)
    }
}

/// Render a JSON value for display: strings bare, everything else as JSON
fn render_value(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "None".to_string(),
    }
}

/// Agents may print bytes that are not UTF-8 (progress bars, locale-encoded
/// logs); those are replaced rather than ending the stream.
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches('\r')
        .to_string()
}

fn parse_line(line: &str) -> Option<BridgeMessage> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_line() {
        let line = r#"{"type":"step","action":"input_text","params":{"index":4,"text":"rust"},"thoughts":"search box found","url":"https://example.com","duration_secs":1.5,"screenshot":"aGVsbG8="}"#;
        let Some(BridgeMessage::Step(step)) = parse_line(line) else {
            panic!("expected step message");
        };
        let event = step.into_event();
        assert_eq!(event.action, "input_text");
        assert_eq!(event.params[0].0, "index");
        assert_eq!(event.params[1].0, "text");
        assert_eq!(event.thoughts.as_deref(), Some("search box found"));
        assert_eq!(event.duration, Some(Duration::from_millis(1500)));
        assert_eq!(event.screenshot.as_deref(), Some("aGVsbG8="));
    }

    #[test]
    fn test_parse_final_line() {
        let Some(BridgeMessage::Final { text }) = parse_line(r#"{"type":"final","text":"done"}"#)
        else {
            panic!("expected final message");
        };
        assert_eq!(text.as_deref(), Some("done"));

        let Some(BridgeMessage::Final { text }) = parse_line(r#"{"type":"final","text":null}"#)
        else {
            panic!("expected final message");
        };
        assert_eq!(text, None);
    }

    #[test]
    fn test_parse_trace_line() {
        let line = r#"{"type":"trace","event":"tool_end","name":"mobile_take_screenshot","output":{"ok":true}}"#;
        let Some(BridgeMessage::Trace(trace)) = parse_line(line) else {
            panic!("expected trace message");
        };
        assert_eq!(
            trace.into_event(),
            Some(AgentEvent::ToolEnd {
                name: "mobile_take_screenshot".to_string(),
                output: r#"{"ok":true}"#.to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_trace_event_is_dropped() {
        let line = r#"{"type":"trace","event":"chain_stream"}"#;
        let Some(BridgeMessage::Trace(trace)) = parse_line(line) else {
            panic!("expected trace message");
        };
        assert_eq!(trace.into_event(), None);
    }

    #[test]
    fn test_non_protocol_lines_are_skipped() {
        assert!(parse_line("INFO [agent] step 1").is_none());
        assert!(parse_line("{not json").is_none());
        assert!(parse_line(r#"{"type":"unknown"}"#).is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn test_decode_line_tolerates_invalid_utf8() {
        assert_eq!(decode_line(b"log \xFF\xFE bytes"), "log \u{FFFD}\u{FFFD} bytes");
        assert_eq!(
            decode_line(b"{\"type\":\"final\",\"text\":\"ok\"}\r"),
            r#"{"type":"final","text":"ok"}"#
        );
        assert!(parse_line(&decode_line(b"\xFF{\"type\":\"final\"}")).is_none());
    }

    #[test]
    fn test_negative_duration_is_ignored() {
        let line = r#"{"type":"step","action":"wait","duration_secs":-1.0}"#;
        let Some(BridgeMessage::Step(step)) = parse_line(line) else {
            panic!("expected step message");
        };
        assert_eq!(step.into_event().duration, None);
    }
}
