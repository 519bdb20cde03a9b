use std::time::Instant;

use tracing::{error, info};

use crate::harness::types::{CaseConfig, HarnessResult, SuiteConfig};
use crate::report::{Status, StatusDetails};
use crate::runner::{CaseOutcome, RunResult};
use crate::validator::TaskValidator;

/// Runs every case of a suite through the validator, one report test per case.
///
/// Case failures are recorded, not returned; only a report that cannot be
/// written stops the run.
pub async fn run_suite(suite: &SuiteConfig, validator: &TaskValidator) -> HarnessResult<RunResult> {
    info!(suite = %suite.name, cases = suite.cases.len(), "running suite");
    let mut run = RunResult {
        success: true,
        cases: Vec::with_capacity(suite.cases.len()),
    };

    for case in &suite.cases {
        let outcome = run_case(case, validator).await?;
        run.push(outcome);
    }

    info!(
        suite = %suite.name,
        passed = run.passed(),
        failed = run.failed(),
        broken = run.broken(),
        "suite finished"
    );
    Ok(run)
}

async fn run_case(case: &CaseConfig, validator: &TaskValidator) -> HarnessResult<CaseOutcome> {
    let sink = validator.sink();
    sink.start_test(&case.name);
    let started = Instant::now();

    let (status, result, error, details) = match validator.validate(case.to_request()).await {
        Ok(text) => (Status::Passed, Some(text), None, None),
        Err(err) => {
            error!(case = %case.name, error = %err, "case did not validate");
            let details = StatusDetails {
                message: Some(err.to_string()),
                trace: Some(format!("{:?}", err)),
            };
            (err.status(), None, Some(err.to_string()), Some(details))
        }
    };

    sink.finish_test(status, details)?;

    Ok(CaseOutcome {
        name: case.name.clone(),
        status,
        result,
        error,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}
