use forge_core::ErrorHint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbError {
    #[error("failed to read kb root {path}: {source}")]
    ReadRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {id}: {source}")]
    Write {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize manifest for {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ErrorHint for KbError {
    fn user_hint(&self) -> String {
        match self {
            KbError::ReadRoot { .. } => "the knowledge base directory could not be read".into(),
            KbError::Write { .. } => "the candidate could not be persisted".into(),
            KbError::Serialize { .. } => "the candidate's manifest could not be encoded".into(),
        }
    }

    fn is_recoverable(&self) -> bool {
        // Disk/IO errors may be transient (permissions fixed, disk freed).
        true
    }
}
