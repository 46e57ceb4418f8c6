use thiserror::Error;

use super::LoadAuthError;

/// Failures while encoding or decoding authentication files
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Truncated {field}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{field} exceeds {max} bytes (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("Header file count mismatch: declared {declared}, found {actual}")]
    CountMismatch { declared: usize, actual: usize },

    #[error("Missing JSON field: {0}")]
    MissingField(&'static str),

    #[error("Invalid JSON field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<CodecError> for LoadAuthError {
    fn from(err: CodecError) -> Self {
        Self::codec_with_source(err.to_string(), err)
    }
}
