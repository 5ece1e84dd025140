//! Test Runner: drives the Sandbox Interpreter across a hypothesis's
//! `TestCase`s, aggregates pass/fail metrics, and evaluates each case's
//! oracle and named property checks.

pub mod checks;
pub mod error;

use std::collections::HashMap;
use std::time::Instant;

use forge_core::{Hypothesis, Spec, Task, TestCase};
use sandbox::Interpreter;
use serde_json::Value;

pub use error::RunnerError;

/// Outcome of running a hypothesis across a set of test cases.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub metrics: HashMap<String, f64>,
    pub all_passed: bool,
}

/// Run `h` against every case in `cases`, aggregating `cases_total`,
/// `cases_passed`, `cases_failed`, and `duration_ms_total`. Each case is
/// executed as its own synthetic [`Task`], inheriting `domain` and `budget`
/// from `parent` so per-case timeouts still respect the caller's overall
/// budget.
pub async fn run(interp: &Interpreter, h: &Hypothesis, parent: &Task, cases: &[TestCase]) -> RunOutcome {
    let mut cases_passed: f64 = 0.0;
    let mut cases_failed: f64 = 0.0;
    let mut duration_ms_total: f64 = 0.0;

    for case in cases {
        let task = synthesize_task(parent, case);
        let started = Instant::now();
        let outcome = interp.execute(h, &task).await;
        duration_ms_total += started.elapsed().as_secs_f64() * 1000.0;

        let passed = match &outcome {
            Ok(result) if result.success => evaluate_case(case, &task.input, &result.output),
            _ => false,
        };

        if passed {
            cases_passed += 1.0;
        } else {
            cases_failed += 1.0;
        }
    }

    let cases_total = cases.len() as f64;
    let mut metrics = HashMap::new();
    metrics.insert("cases_total".to_string(), cases_total);
    metrics.insert("cases_passed".to_string(), cases_passed);
    metrics.insert("cases_failed".to_string(), cases_failed);
    metrics.insert("duration_ms_total".to_string(), duration_ms_total);

    RunOutcome {
        all_passed: cases_failed == 0.0 && cases_total > 0.0,
        metrics,
    }
}

fn synthesize_task(parent: &Task, case: &TestCase) -> Task {
    let mut spec = Spec::default();
    spec.props.insert(
        "checks".to_string(),
        Value::Array(case.checks.iter().cloned().map(Value::String).collect()),
    );
    Task {
        id: format!("{}::{}", parent.id, case.name),
        domain: parent.domain.clone(),
        spec,
        input: case.input.clone(),
        budget: parent.budget,
        created_at: parent.created_at,
    }
}

fn evaluate_case(case: &TestCase, input: &Value, output: &Value) -> bool {
    if let Some(oracle) = &case.oracle {
        if oracle != output {
            return false;
        }
    }
    case.checks
        .iter()
        .all(|check| checks::evaluate_check(check, input, output))
}
