//! Report sink abstraction.
//!
//! A sink receives artifacts grouped hierarchically under test and step
//! labels and stores them for later rendering:
//! - `AllureSink` writes an `allure-results` directory (see `allure`)
//! - `MemorySink` keeps everything in memory (testing and embedding)
//!
//! Sinks are write-only from the harness' point of view.

use parking_lot::Mutex;

use super::tree::{ReportNode, StepStack};
use super::types::{Attachment, ReportError, ReportResult, Status, StatusDetails};

/// Trait for report sinks
pub trait ReportSink: Send + Sync {
    /// Begin a new test; subsequent steps and attachments belong to it
    fn start_test(&self, name: &str);

    /// Close the current test with its final status
    fn finish_test(&self, status: Status, details: Option<StatusDetails>) -> ReportResult<()>;

    /// Open a nested step under the current test or step
    fn start_step(&self, name: &str);

    /// Close the innermost open step
    fn stop_step(&self, status: Status);

    /// Attach an artifact to the innermost open step (or the test)
    fn attach(&self, attachment: Attachment);

    /// Store the session's environment properties
    fn write_environment(&self, properties: &[(String, String)]) -> ReportResult<()>;
}

/// Sink that keeps reports in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    stack: Mutex<StepStack>,
    finished: Mutex<Vec<ReportNode>>,
    environments: Mutex<Vec<Vec<(String, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The test currently being recorded, if any
    pub fn current(&self) -> Option<ReportNode> {
        self.stack.lock().snapshot()
    }

    /// Tests finished so far
    pub fn finished(&self) -> Vec<ReportNode> {
        self.finished.lock().clone()
    }

    /// Every environment written, in order
    pub fn environments(&self) -> Vec<Vec<(String, String)>> {
        self.environments.lock().clone()
    }
}

impl ReportSink for MemorySink {
    fn start_test(&self, name: &str) {
        self.stack.lock().start_test(name);
    }

    fn finish_test(&self, status: Status, details: Option<StatusDetails>) -> ReportResult<()> {
        let mut root = self
            .stack
            .lock()
            .finish(status)
            .ok_or_else(|| ReportError::State("no test in progress".to_string()))?;
        root.details = details;
        self.finished.lock().push(root);
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
        self.environments.lock().push(properties.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_finished_tests() {
        let sink = MemorySink::new();
        sink.start_test("first");
        sink.start_step("step");
        sink.attach(Attachment::text("note", "hello"));
        sink.stop_step(Status::Passed);
        sink.finish_test(Status::Failed, Some(StatusDetails::message("boom")))
            .unwrap();

        let finished = sink.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, Some(Status::Failed));
        assert_eq!(
            finished[0].details.as_ref().and_then(|d| d.message.as_deref()),
            Some("boom")
        );
        assert!(sink.current().is_none());
    }

    #[test]
    fn test_memory_sink_finish_without_test() {
        let sink = MemorySink::new();
        assert!(matches!(
            sink.finish_test(Status::Passed, None),
            Err(ReportError::State(_))
        ));
    }
}
