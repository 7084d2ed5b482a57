//! # Recognition Error Types
//!
//! Errors returned across the recognition-engine and table-extraction
//! boundaries. Callers can tell "the engine failed" apart from "the page is
//! legitimately blank" by matching on these instead of checking for empty text.

/// Failure of a single recognition call.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionError {
    /// The engine or its language data is not installed
    EngineUnavailable(String),
    /// The raster could not be handed to the engine
    Corrupt(String),
    /// The engine did not answer in time
    Timeout(String),
}

impl RecognitionError {
    /// Short stable label used for metrics and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RecognitionError::EngineUnavailable(_) => "engine_unavailable",
            RecognitionError::Corrupt(_) => "corrupt",
            RecognitionError::Timeout(_) => "timeout",
        }
    }
}

impl std::fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionError::EngineUnavailable(msg) => {
                write!(f, "[ENGINE_UNAVAILABLE] Recognition engine is not available: {}", msg)
            }
            RecognitionError::Corrupt(msg) => {
                write!(f, "[CORRUPT_INPUT] Raster could not be recognized: {}", msg)
            }
            RecognitionError::Timeout(msg) => {
                write!(f, "[ENGINE_TIMEOUT] Recognition timed out: {}", msg)
            }
        }
    }
}

impl std::error::Error for RecognitionError {}

/// Failure of the table-extraction collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum TableError {
    /// No table backend can serve this document
    BackendUnavailable(String),
    /// The document could not be read or analysed
    Unreadable(String),
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::BackendUnavailable(msg) => {
                write!(f, "[TABLE_BACKEND] Table extraction backend unavailable: {}", msg)
            }
            TableError::Unreadable(msg) => {
                write!(f, "[TABLE_READ] Document could not be analysed for tables: {}", msg)
            }
        }
    }
}

impl std::error::Error for TableError {}

impl From<RecognitionError> for TableError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::EngineUnavailable(msg) => TableError::BackendUnavailable(msg),
            other => TableError::Unreadable(other.to_string()),
        }
    }
}
