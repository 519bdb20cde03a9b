//! Step-by-step recording of agent activity.
//!
//! `StepRecorder` turns every action the agent reports into a report step
//! carrying the agent's thoughts, the active URL, the step duration and a
//! screenshot. `EventLog` keeps the runtime's lifecycle trace (node, tool and
//! model events) as individual attachments plus one complete log.
//!
//! Nothing here fails the task: a missing or undecodable artifact is logged
//! and skipped.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_CAPTURE_TIMEOUT;
use crate::report::{Attachment, AttachmentKind, ReportSink, Status};
use crate::runtime::{AgentEvent, DeviceProbe, ProbeError, StepEvent, with_timeout};

pub const THOUGHTS_ATTACHMENT: &str = "Agent Thoughts";
pub const URL_ATTACHMENT: &str = "URL";
pub const DURATION_ATTACHMENT: &str = "Step Duration";
pub const SCREENSHOT_ATTACHMENT: &str = "Screenshot after Action";
pub const EVENT_LOG_ATTACHMENT: &str = "Complete Agent Event Log";

/// Errors while obtaining a step screenshot; always swallowed
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screenshot is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),
}

/// Records agent steps into a report sink
pub struct StepRecorder {
    sink: Arc<dyn ReportSink>,
    probe: Option<Arc<dyn DeviceProbe>>,
    capture_timeout: Duration,
}

impl StepRecorder {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            probe: None,
            capture_timeout: Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT),
        }
    }

    /// Probe used for steps that arrive without a screenshot
    ///
    /// The fallback capture is taken when the step is recorded, not when it
    /// happened. Runtimes that keep acting without waiting for the event
    /// channel to drain can get a later screen state here. Embed the
    /// screenshot in the step when the exact frame matters; an embedded
    /// screenshot always takes precedence over the probe.
    pub fn with_probe(mut self, probe: Arc<dyn DeviceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Record one step. Never fails.
    pub async fn record(&self, event: &StepEvent) {
        let label = step_label(event);
        info!(step = %label, "recording step");
        self.sink.start_step(&label);

        if let Some(thoughts) = &event.thoughts {
            self.sink.attach(Attachment::text(THOUGHTS_ATTACHMENT, thoughts.clone()));
        }

        let url = event.url.as_deref().unwrap_or("N/A");
        self.sink.attach(Attachment::uri_list(URL_ATTACHMENT, &[url]));

        if let Some(duration) = event.duration {
            self.sink.attach(Attachment::text(
                DURATION_ATTACHMENT,
                format_duration(duration),
            ));
        }

        match self.screenshot_for(event).await {
            Ok(Some(bytes)) => self.sink.attach(image_attachment(SCREENSHOT_ATTACHMENT, bytes)),
            Ok(None) => debug!(step = %label, "no screenshot available"),
            Err(err) => warn!(step = %label, error = %err, "failed to take or attach screenshot"),
        }

        self.sink.stop_step(Status::Passed);
    }

    async fn screenshot_for(&self, event: &StepEvent) -> Result<Option<Vec<u8>>, CaptureError> {
        if let Some(encoded) = &event.screenshot {
            return Ok(Some(decode_screenshot(encoded)?));
        }
        match &self.probe {
            Some(probe) => Ok(Some(with_timeout(self.capture_timeout, probe.screenshot()).await?)),
            None => Ok(None),
        }
    }
}

/// Build the step label: `Action: name(k=v, k2=v2)`
pub fn step_label(event: &StepEvent) -> String {
    let mut label = format!("Action: {}", event.action);
    if !event.params.is_empty() {
        let params = event
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, render_param(v)))
            .collect::<Vec<_>>()
            .join(", ");
        label.push_str(&format!("({})", params));
    }
    label
}

fn render_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format a step duration as seconds with two decimals
pub fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f64())
}

/// Decode a base64 screenshot, accepting an optional `data:` URL prefix
pub fn decode_screenshot(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}

/// Wrap image bytes in an attachment, sniffing JPEG vs PNG.
///
/// Anything not recognized as JPEG is attached as PNG.
pub fn image_attachment(name: impl Into<String>, bytes: Vec<u8>) -> Attachment {
    let kind = match image::guess_format(&bytes) {
        Ok(image::ImageFormat::Jpeg) => AttachmentKind::Jpeg,
        _ => AttachmentKind::Png,
    };
    Attachment::image(name, kind, bytes)
}

/// Running log of the runtime's trace events for one instruction
pub struct EventLog {
    sink: Arc<dyn ReportSink>,
    entries: Vec<String>,
}

impl EventLog {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self {
            sink,
            entries: Vec::new(),
        }
    }

    /// Log the event, attach it, and keep it for the complete log
    pub fn dispatch(&mut self, event: &AgentEvent) {
        let message = event.describe();
        debug!(event = %message, "agent event");

        let timestamp = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.entries.push(format!("{:.3}: {}", timestamp, message));

        self.sink
            .attach(Attachment::text(format!("Agent {}", event.kind()), message));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn complete_log(&self) -> String {
        self.entries.join("\n")
    }

    /// Attach the complete log, if anything was logged
    pub fn attach_complete_log(&self) {
        if !self.entries.is_empty() {
            self.sink
                .attach(Attachment::text(EVENT_LOG_ATTACHMENT, self.complete_log()));
        }
    }
}
