use forge_core::ErrorHint;
use thiserror::Error;

/// Failure modes of [`crate::Interpreter::execute`]. None of these are
/// retried at this layer -- the Solver decides whether to try the next
/// candidate.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("hypothesis bytes do not validate as a wasm module: {0}")]
    CompileFailed(String),

    #[error("runtime could not place the instance under the declared memory limit: {0}")]
    InstantiateFailed(String),

    #[error("required export '{0}' is missing from the module")]
    NoEntry(String),

    #[error("linear memory too small for the supplied input")]
    OutOfMemory,

    #[error("wall-clock budget exceeded before the module returned")]
    Timeout,

    #[error("returned region was not valid JSON: {0}")]
    OutputDecodeFailed(String),
}

impl ErrorHint for SandboxError {
    fn user_hint(&self) -> String {
        match self {
            SandboxError::CompileFailed(_) => "the candidate module failed to compile".into(),
            SandboxError::InstantiateFailed(_) => {
                "the candidate module could not be instantiated under its memory limit".into()
            }
            SandboxError::NoEntry(entry) => format!("the module does not export '{entry}'"),
            SandboxError::OutOfMemory => "the module ran out of linear memory".into(),
            SandboxError::Timeout => "the module did not return before its deadline".into(),
            SandboxError::OutputDecodeFailed(_) => {
                "the module's output was not valid JSON".into()
            }
        }
    }

    fn is_recoverable(&self) -> bool {
        // None of these are transient: the same bytes will fail the same
        // way again. A different candidate might not.
        false
    }
}
