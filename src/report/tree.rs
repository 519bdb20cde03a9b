//! In-progress report tree shared by the sink implementations.

use chrono::Utc;
use tracing::warn;

use super::types::{Attachment, Status, StatusDetails};

/// Name given to a test that was never explicitly started
pub const DEFAULT_TEST_NAME: &str = "agent task";

/// A test or step with its attachments and nested steps
#[derive(Debug, Clone, PartialEq)]
pub struct ReportNode {
    pub name: String,
    /// None while the node is still open
    pub status: Option<Status>,
    pub details: Option<StatusDetails>,
    /// Start time, milliseconds since the epoch
    pub start: i64,
    /// Stop time, milliseconds since the epoch
    pub stop: Option<i64>,
    pub attachments: Vec<Attachment>,
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: None,
            details: None,
            start: Utc::now().timestamp_millis(),
            stop: None,
            attachments: Vec::new(),
            children: Vec::new(),
        }
    }

    fn close(&mut self, status: Status) {
        self.status = Some(status);
        self.stop = Some(Utc::now().timestamp_millis());
    }

    /// First attachment with the given name on this node
    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == name)
    }

    /// Depth-first search for a step by exact name
    pub fn find_step(&self, name: &str) -> Option<&ReportNode> {
        self.children.iter().find_map(|child| {
            if child.name == name {
                Some(child)
            } else {
                child.find_step(name)
            }
        })
    }

    /// All steps under this node, depth-first, pre-order
    pub fn all_steps(&self) -> Vec<&ReportNode> {
        let mut steps = Vec::new();
        for child in &self.children {
            steps.push(child);
            steps.extend(child.all_steps());
        }
        steps
    }

    /// All attachments on this node and its descendants, pre-order
    pub fn all_attachments(&self) -> Vec<&Attachment> {
        let mut attachments: Vec<&Attachment> = self.attachments.iter().collect();
        for child in &self.children {
            attachments.extend(child.all_attachments());
        }
        attachments
    }
}

/// Stack of open nodes; index 0 is the test itself
#[derive(Debug, Default)]
pub struct StepStack {
    open: Vec<ReportNode>,
}

impl StepStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_test(&mut self, name: &str) {
        if let Some(previous) = self.open.first() {
            warn!(test = %previous.name, "starting a new test while another is open; discarding it");
        }
        self.open = vec![ReportNode::new(name)];
    }

    pub fn start_step(&mut self, name: &str) {
        self.ensure_root();
        self.open.push(ReportNode::new(name));
    }

    pub fn stop_step(&mut self, status: Status) {
        if self.open.len() <= 1 {
            warn!("stop_step called with no open step");
            return;
        }
        if let Some(mut step) = self.open.pop() {
            step.close(status);
            if let Some(parent) = self.open.last_mut() {
                parent.children.push(step);
            }
        }
    }

    pub fn attach(&mut self, attachment: Attachment) {
        self.ensure_root();
        if let Some(node) = self.open.last_mut() {
            node.attachments.push(attachment);
        }
    }

    /// Close every open node and return the finished test.
    ///
    /// Steps still open at this point are marked broken.
    pub fn finish(&mut self, status: Status) -> Option<ReportNode> {
        let open = std::mem::take(&mut self.open);
        let mut root = fold(open, Some(Status::Broken))?;
        root.close(status);
        Some(root)
    }

    /// Copy of the current tree without closing anything
    pub fn snapshot(&self) -> Option<ReportNode> {
        fold(self.open.clone(), None)
    }

    pub fn is_open(&self) -> bool {
        !self.open.is_empty()
    }

    fn ensure_root(&mut self) {
        if self.open.is_empty() {
            self.open.push(ReportNode::new(DEFAULT_TEST_NAME));
        }
    }
}

fn fold(mut open: Vec<ReportNode>, close_with: Option<Status>) -> Option<ReportNode> {
    while open.len() > 1 {
        let mut step = open.pop()?;
        if let Some(status) = close_with {
            step.close(status);
        }
        open.last_mut()?.children.push(step);
    }
    open.pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_steps() {
        let mut stack = StepStack::new();
        stack.start_test("login");
        stack.start_step("outer");
        stack.attach(Attachment::text("a", "1"));
        stack.start_step("inner");
        stack.attach(Attachment::text("b", "2"));
        stack.stop_step(Status::Passed);
        stack.stop_step(Status::Failed);

        let root = stack.finish(Status::Failed).unwrap();
        assert_eq!(root.name, "login");
        assert_eq!(root.status, Some(Status::Failed));
        let outer = root.find_step("outer").unwrap();
        assert_eq!(outer.status, Some(Status::Failed));
        assert_eq!(outer.attachment("a").and_then(|a| a.as_text()), Some("1"));
        let inner = root.find_step("inner").unwrap();
        assert_eq!(inner.status, Some(Status::Passed));
        assert!(!stack.is_open());
    }

    #[test]
    fn test_finish_breaks_open_steps() {
        let mut stack = StepStack::new();
        stack.start_test("t");
        stack.start_step("dangling");
        let root = stack.finish(Status::Passed).unwrap();
        assert_eq!(root.find_step("dangling").unwrap().status, Some(Status::Broken));
    }

    #[test]
    fn test_attach_without_test_opens_default_root() {
        let mut stack = StepStack::new();
        stack.attach(Attachment::text("note", "x"));
        let snapshot = stack.snapshot().unwrap();
        assert_eq!(snapshot.name, DEFAULT_TEST_NAME);
        assert_eq!(snapshot.status, None);
        assert!(stack.is_open());
    }

    #[test]
    fn test_stop_step_without_step_is_ignored() {
        let mut stack = StepStack::new();
        stack.start_test("t");
        stack.stop_step(Status::Passed);
        let root = stack.finish(Status::Passed).unwrap();
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_finish_empty_stack() {
        assert!(StepStack::new().finish(Status::Passed).is_none());
    }
}
