use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::report::ReportError;
use crate::validator::TaskRequest;

/// One task case in a suite file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConfig {
    /// Test name shown in the report
    pub name: String,

    /// Natural-language instruction for the agent
    pub instruction: String,

    /// Text the agent's final answer must contain
    #[serde(default)]
    pub expected_substring: Option<String>,

    /// Compare case-insensitively
    #[serde(default)]
    pub ignore_case: bool,

    /// Instructions run before the main one (connect, launch, ...)
    #[serde(default)]
    pub preconditions: Vec<String>,
}

impl CaseConfig {
    pub fn to_request(&self) -> TaskRequest {
        TaskRequest {
            instruction: self.instruction.clone(),
            expected_substring: self.expected_substring.clone(),
            ignore_case: self.ignore_case,
            preconditions: self.preconditions.clone(),
        }
    }
}

/// A suite of task cases, loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Suite name
    pub name: String,

    /// Target location prefixed to every main instruction
    #[serde(default)]
    pub base_url: Option<String>,

    /// Cases, run in order
    pub cases: Vec<CaseConfig>,
}

impl SuiteConfig {
    /// Load a suite from a JSON file
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> HarnessResult<Self> {
        serde_json::from_str(content).map_err(HarnessError::Parse)
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error types for harness operations
#[derive(Debug)]
pub enum HarnessError {
    /// Suite file is not valid JSON or misses fields
    Parse(serde_json::Error),

    /// Report could not be written
    Report(ReportError),

    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarnessError::Parse(err) => write!(f, "Suite parse error: {}", err),
            HarnessError::Report(err) => write!(f, "Report error: {}", err),
            HarnessError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarnessError::Parse(err) => Some(err),
            HarnessError::Report(err) => Some(err),
            HarnessError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::Io(err)
    }
}

impl From<ReportError> for HarnessError {
    fn from(err: ReportError) -> Self {
        HarnessError::Report(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_from_json_defaults() {
        let suite = SuiteConfig::from_json(
            r#"{
                "name": "community",
                "base_url": "https://discuss.google.dev/",
                "cases": [
                    {"name": "search", "instruction": "search for Looker", "expected_substring": "looker", "ignore_case": true},
                    {"name": "plain", "instruction": "open the menu", "preconditions": ["launch Chrome"]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(suite.base_url.as_deref(), Some("https://discuss.google.dev/"));
        let search = suite.cases[0].to_request();
        assert_eq!(search.expected_substring.as_deref(), Some("looker"));
        assert!(search.ignore_case);
        let plain = suite.cases[1].to_request();
        assert_eq!(plain.expected_substring, None);
        assert!(!plain.ignore_case);
        assert_eq!(plain.preconditions, vec!["launch Chrome"]);
    }

    #[test]
    fn test_suite_missing_cases_is_parse_error() {
        assert!(matches!(
            SuiteConfig::from_json(r#"{"name": "x"}"#),
            Err(HarnessError::Parse(_))
        ));
    }
}
