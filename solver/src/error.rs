use forge_core::ErrorHint;
use thiserror::Error;

/// Failure modes specific to orchestration. Sandbox/runner/KB errors are
/// swallowed inside the loop per the state machine's failure semantics --
/// this enum only covers the one step the loop cannot recover from on its
/// own: the LLM failing to produce a usable proposal.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("llm proposal call failed: {0}")]
    ProposalFailed(String),

    #[error("llm proposal response was not a usable candidate: {0}")]
    InvalidProposal(String),
}

impl ErrorHint for SolverError {
    fn user_hint(&self) -> String {
        match self {
            SolverError::ProposalFailed(_) => "the model could not be reached for a proposal".into(),
            SolverError::InvalidProposal(_) => "the model's proposal could not be used".into(),
        }
    }

    fn is_recoverable(&self) -> bool {
        // A retry of the same task (new prompt, new sampling) could succeed.
        true
    }
}
