use std::fmt::{Display, Formatter};

use refrate_store::StoreError;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Validation and contract errors exposed by `refrate-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("currency must be a 3-letter uppercase ISO code: '{value}'")]
    InvalidCurrency { value: String },

    #[error("rate must be a non-negative decimal literal: '{value}'")]
    InvalidRate { value: String },

    #[error("column schema cannot be empty")]
    EmptySchema,

    #[error("row carries {actual} rate(s) but the schema has {expected} column(s)")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("timestamp must match YYYY-MM-DD HH:MM: '{value}'")]
    InvalidTimestamp { value: String },
}

/// Pipeline stage a document failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquisition,
    Extraction,
    DateResolution,
    TableParsing,
    Merge,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::Extraction => "extraction",
            Self::DateResolution => "date resolution",
            Self::TableParsing => "table parsing",
            Self::Merge => "merge",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy for one document's ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The document could not be retrieved or did not validate.
    #[error("acquisition failed: {0}")]
    Acquisition(String),

    /// The container could not be opened. Routes to the image path.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// No extraction path produced usable content.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// The publication timestamp could not be resolved unambiguously.
    #[error("date/time extraction failed: {0}")]
    DateTimeExtraction(String),

    /// A rate table was located but no row matched its schema.
    #[error("no rates found: {0}")]
    NoRatesFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Acquisition(_) => Stage::Acquisition,
            Self::MalformedDocument(_) | Self::ExtractionFailed(_) | Self::Io(_) => {
                Stage::Extraction
            }
            Self::DateTimeExtraction(_) => Stage::DateResolution,
            Self::NoRatesFound(_) | Self::Validation(_) => Stage::TableParsing,
            Self::Store(_) => Stage::Merge,
        }
    }
}

/// A per-document failure as surfaced to operators and batch reports.
#[derive(Debug, Error, Serialize)]
#[error("{document}: {stage} failed: {error}")]
pub struct DocumentFailure {
    pub document: String,
    pub stage: Stage,
    #[serde(serialize_with = "serialize_display")]
    pub error: IngestError,
}

impl DocumentFailure {
    pub fn new(document: impl Into<String>, error: IngestError) -> Self {
        Self {
            document: document.into(),
            stage: error.stage(),
            error,
        }
    }
}

fn serialize_display<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Display,
{
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_names_document_and_stage() {
        let failure = DocumentFailure::new(
            "pdf_files/2024/1/2024-01-05.pdf",
            IngestError::DateTimeExtraction(String::from("ambiguous date '03-04-2024'")),
        );

        assert_eq!(failure.stage, Stage::DateResolution);
        assert_eq!(
            failure.to_string(),
            "pdf_files/2024/1/2024-01-05.pdf: date resolution failed: \
             date/time extraction failed: ambiguous date '03-04-2024'"
        );
    }

    #[test]
    fn failure_serializes_error_as_message() {
        let failure = DocumentFailure::new("a.pdf", IngestError::NoRatesFound(String::from("page 2")));
        let json = serde_json::to_value(&failure).expect("serialize");
        assert_eq!(json["stage"], "table_parsing");
        assert_eq!(json["error"], "no rates found: page 2");
    }
}
