use refrate_core::{ConfigError, DocumentFailure, IngestError, Stage, StoreError, ValidationError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A single document could not be ingested.
    #[error(transparent)]
    Document(#[from] DocumentFailure),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::Config(_) => 2,
            Self::Document(failure) if failure.stage == Stage::Acquisition => 7,
            Self::Document(_) => 3,
            Self::Ingest(_) => 8,
            Self::Store(_) => 8,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_failures_have_their_own_exit_code() {
        let acquisition = CliError::from(DocumentFailure::new(
            "https://example.test/rates.pdf",
            IngestError::Acquisition(String::from("all tiers exhausted")),
        ));
        let parsing = CliError::from(DocumentFailure::new(
            "a.pdf",
            IngestError::NoRatesFound(String::from("no rows")),
        ));

        assert_eq!(acquisition.exit_code(), 7);
        assert_eq!(parsing.exit_code(), 3);
        assert_eq!(CliError::Command(String::from("bad")).exit_code(), 2);
    }
}
