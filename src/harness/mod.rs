pub mod suite;
pub mod types;

pub use suite::run_suite;
pub use types::{CaseConfig, HarnessError, HarnessResult, SuiteConfig};
