pub mod allure;
pub mod sink;
pub mod tree;
pub mod types;

pub use allure::{AllureSink, ENVIRONMENT_PROPERTIES_FILENAME, render_properties};
pub use sink::{MemorySink, ReportSink};
pub use tree::{DEFAULT_TEST_NAME, ReportNode, StepStack};
pub use types::{Attachment, AttachmentKind, ReportError, ReportResult, Status, StatusDetails};
