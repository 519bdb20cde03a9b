//! Allure results writer.
//!
//! Produces the files the Allure report generator reads:
//! - `{uuid}-result.json` per finished test, with nested steps
//! - `{uuid}-attachment.{ext}` per attachment
//! - `environment.properties` for the session environment

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::sink::ReportSink;
use super::tree::{ReportNode, StepStack};
use super::types::{Attachment, ReportError, ReportResult, Status, StatusDetails};
use crate::session::sanitize_name;

/// File name Allure expects for environment properties
pub const ENVIRONMENT_PROPERTIES_FILENAME: &str = "environment.properties";

/// Sink writing Allure result files into a directory
#[derive(Debug)]
pub struct AllureSink {
    dir: PathBuf,
    stack: Mutex<StepStack>,
}

impl AllureSink {
    /// Create a sink writing into `dir`, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> ReportResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            stack: Mutex::new(StepStack::new()),
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.dir
    }

    fn write_attachment(&self, attachment: &Attachment) -> ReportResult<AttachmentRef> {
        let source = format!(
            "{}-attachment.{}",
            Uuid::new_v4(),
            attachment.kind.extension()
        );
        fs::write(self.dir.join(&source), &attachment.content)?;
        Ok(AttachmentRef {
            name: attachment.name.clone(),
            source,
            mime: attachment.kind.mime().to_string(),
        })
    }

    fn write_attachments(&self, node: &ReportNode) -> ReportResult<Vec<AttachmentRef>> {
        node.attachments
            .iter()
            .map(|a| self.write_attachment(a))
            .collect()
    }

    fn convert_step(&self, node: &ReportNode) -> ReportResult<StepRecord> {
        Ok(StepRecord {
            name: node.name.clone(),
            status: node.status.unwrap_or(Status::Broken),
            stage: "finished",
            attachments: self.write_attachments(node)?,
            steps: node
                .children
                .iter()
                .map(|c| self.convert_step(c))
                .collect::<ReportResult<Vec<_>>>()?,
            start: node.start,
            stop: node.stop.unwrap_or(node.start),
        })
    }

    fn write_result(&self, root: &ReportNode) -> ReportResult<PathBuf> {
        let uuid = Uuid::new_v4().to_string();
        let record = ResultRecord {
            uuid: uuid.clone(),
            history_id: sanitize_name(&root.name),
            full_name: root.name.clone(),
            name: root.name.clone(),
            status: root.status.unwrap_or(Status::Broken),
            status_details: root.details.clone(),
            stage: "finished",
            attachments: self.write_attachments(root)?,
            steps: root
                .children
                .iter()
                .map(|c| self.convert_step(c))
                .collect::<ReportResult<Vec<_>>>()?,
            labels: vec![
                Label::new("framework", env!("CARGO_PKG_NAME")),
                Label::new("host", host_label()),
            ],
            start: root.start,
            stop: root.stop.unwrap_or(root.start),
        };

        let path = self.dir.join(format!("{}-result.json", uuid));
        fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        Ok(path)
    }
}

impl ReportSink for AllureSink {
    fn start_test(&self, name: &str) {
        debug!(test = %name, "allure: start test");
        self.stack.lock().start_test(name);
    }

    fn finish_test(&self, status: Status, details: Option<StatusDetails>) -> ReportResult<()> {
        let mut root = self
            .stack
            .lock()
            .finish(status)
            .ok_or_else(|| ReportError::State("no test in progress".to_string()))?;
        root.details = details;
        let path = self.write_result(&root)?;
        info!(test = %root.name, path = %path.display(), "allure result written");
        Ok(())
    }

    fn start_step(&self, name: &str) {
        self.stack.lock().start_step(name);
    }

    fn stop_step(&self, status: Status) {
        self.stack.lock().stop_step(status);
    }

    fn attach(&self, attachment: Attachment) {
        self.stack.lock().attach(attachment);
    }

    fn write_environment(&self, properties: &[(String, String)]) -> ReportResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(ENVIRONMENT_PROPERTIES_FILENAME);
        fs::write(&path, render_properties(properties))?;
        info!(path = %path.display(), "environment properties written");
        Ok(())
    }
}

/// Render `key=value` lines in Java properties syntax
pub fn render_properties(properties: &[(String, String)]) -> String {
    properties
        .iter()
        .map(|(k, v)| format!("{}={}\n", escape_key(k), escape_value(v)))
        .collect()
}

fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn escape_key(key: &str) -> String {
    escape_value(key)
        .replace('=', "\\=")
        .replace(':', "\\:")
        .replace(' ', "\\ ")
}

fn host_label() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

// ============================================================================
// Result file format
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResultRecord {
    uuid: String,
    history_id: String,
    full_name: String,
    name: String,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_details: Option<StatusDetails>,
    stage: &'static str,
    attachments: Vec<AttachmentRef>,
    steps: Vec<StepRecord>,
    labels: Vec<Label>,
    start: i64,
    stop: i64,
}

#[derive(Debug, Serialize)]
struct StepRecord {
    name: String,
    status: Status,
    stage: &'static str,
    attachments: Vec<AttachmentRef>,
    steps: Vec<StepRecord>,
    start: i64,
    stop: i64,
}

#[derive(Debug, Serialize)]
struct AttachmentRef {
    name: String,
    source: String,
    #[serde(rename = "type")]
    mime: String,
}

#[derive(Debug, Serialize)]
struct Label {
    name: String,
    value: String,
}

impl Label {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_properties() {
        let props = vec![
            ("operating_system".to_string(), "linux 6.1".to_string()),
            ("headless_mode".to_string(), "true".to_string()),
        ];
        assert_eq!(
            render_properties(&props),
            "operating_system=linux 6.1\nheadless_mode=true\n"
        );
    }

    #[test]
    fn test_render_properties_escapes() {
        let props = vec![("a key".to_string(), "line1\nline2\\x".to_string())];
        assert_eq!(render_properties(&props), "a\\ key=line1\\nline2\\\\x\n");
    }
}
