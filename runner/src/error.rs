use forge_core::ErrorHint;
use thiserror::Error;

/// The Test Runner itself rarely fails outright -- individual case failures
/// are folded into the aggregated metrics, not surfaced as errors. This
/// enum covers the cases where the runner cannot proceed at all.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("test case '{0}' input was not valid for synthesizing a task")]
    InvalidCaseInput(String),
}

impl ErrorHint for RunnerError {
    fn user_hint(&self) -> String {
        match self {
            RunnerError::InvalidCaseInput(name) => {
                format!("test case '{name}' could not be prepared for execution")
            }
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}
