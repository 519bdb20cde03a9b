//! Types for suite run results.

use serde::{Deserialize, Serialize};

use crate::report::Status;

/// Outcome of a single case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcome {
    /// Case name as written to the report
    pub name: String,

    /// Final report status
    pub status: Status,

    /// Agent result text (None if the case did not validate)
    pub result: Option<String>,

    /// Error message if the case failed or broke
    pub error: Option<String>,

    /// Wall-clock duration of the case
    pub duration_ms: u64,
}

/// Result of a complete suite run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether every case passed
    pub success: bool,

    /// Outcomes in execution order
    pub cases: Vec<CaseOutcome>,
}

impl RunResult {
    pub fn push(&mut self, outcome: CaseOutcome) {
        self.cases.push(outcome);
        self.success = self.cases.iter().all(|c| c.status == Status::Passed);
    }

    pub fn passed(&self) -> usize {
        self.count(Status::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(Status::Failed)
    }

    pub fn broken(&self) -> usize {
        self.count(Status::Broken)
    }

    fn count(&self, status: Status) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, status: Status) -> CaseOutcome {
        CaseOutcome {
            name: name.to_string(),
            status,
            result: None,
            error: None,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_counts_and_success() {
        let mut run = RunResult::default();
        run.push(outcome("a", Status::Passed));
        assert!(run.success);
        run.push(outcome("b", Status::Failed));
        run.push(outcome("c", Status::Broken));
        assert!(!run.success);
        assert_eq!((run.passed(), run.failed(), run.broken()), (1, 1, 1));
    }
}
