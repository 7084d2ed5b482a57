//! # Application Error Types
//!
//! This module defines the error types that can end processing of a document.
//! Everything the quality pipeline can recover from (no contour found, engine
//! failure on one attempt, unreadable tables) is handled where it happens and
//! never reaches these types.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Missing or undecodable input documents
    Input(String),
    /// Result persistence errors (disk, permissions)
    Storage(String),
    /// Recognition engine errors surfaced at startup
    Recognition(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Input(msg) => write!(f, "[INPUT] {}", msg),
            AppError::Storage(msg) => write!(f, "[STORAGE] {}", msg),
            AppError::Recognition(msg) => write!(f, "[RECOGNITION] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Storage(format!("failed to serialize results: {}", err))
    }
}

impl From<crate::ocr_errors::RecognitionError> for AppError {
    fn from(err: crate::ocr_errors::RecognitionError) -> Self {
        AppError::Recognition(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the application
pub mod error_logging {
    use tracing::error;

    /// Log a failed recognition call with page and attempt context
    pub fn log_recognition_error(
        error: &impl std::fmt::Display,
        page_index: Option<usize>,
        attempt: u32,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = "recognize",
            page_index = ?page_index,
            attempt = %attempt,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "Recognition failed"
        );
    }

    /// Log file system errors with path and operation context
    pub fn log_storage_error(error: &impl std::fmt::Display, operation: &str, path: Option<&str>) {
        error!(
            error = %error,
            operation = %operation,
            path = ?path,
            "Result storage failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
