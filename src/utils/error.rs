use serde::Serialize;
use thiserror::Error;

/// Failures that stop a whole extraction request.
///
/// Detection-stage errors are fatal; per-field recognition problems never
/// surface here, they degrade individual attributes of the result instead.
#[derive(Debug, Error)]
pub enum IdCardError {
    #[error("Image loading error: {0}")]
    ImageLoad(String),

    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Text recognition error: {0}")]
    Recognition(String),

    #[error("No ID card detected in the image")]
    NoCardDetected,

    #[error("No fields detected on the ID card")]
    NoFieldsDetected,

    #[error("Extraction timed out or was cancelled")]
    Timeout,
}

/// Structural problems found while decoding a national identifier.
///
/// `UnknownGovernorate` is the only non-fatal kind: it is reported next to an
/// otherwise decoded identity.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NationalIdError {
    #[error("National ID must have 14 digits, found {length}")]
    InvalidFormat { length: usize },

    #[error("Invalid century digit '{0}'")]
    InvalidCentury(char),

    #[error("Invalid birth date {year:04}-{month:02}-{day:02}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    #[error("Unknown governorate code {0}")]
    UnknownGovernorate(String),
}

impl NationalIdError {
    /// Whether this error invalidates the whole decode.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NationalIdError::UnknownGovernorate(_))
    }
}
