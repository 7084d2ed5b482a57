//! # Logging Configuration
//!
//! Environment-driven settings for the tracing subscriber.

use std::env;

/// Output format of the log layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging configuration for different environments
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// Log level for this crate's targets
    pub log_level: String,
    /// Log level for the preprocessing target
    pub preprocessing_log_level: Option<String>,
    /// Explicit format override; derived from the environment when absent
    pub format: Option<LogFormat>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
            preprocessing_log_level: None,
            format: None,
        }
    }
}

impl LoggingConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            preprocessing_log_level: env::var("PREPROCESSING_LOG_LEVEL").ok(),
            format: env::var("LOG_FORMAT")
                .ok()
                .and_then(|value| match value.to_lowercase().as_str() {
                    "pretty" => Some(LogFormat::Pretty),
                    "json" => Some(LogFormat::Json),
                    _ => None,
                }),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Effective output format: explicit override first, then pretty in development.
    pub fn effective_format(&self) -> LogFormat {
        match self.format {
            Some(format) => format,
            None if self.is_development() => LogFormat::Pretty,
            None => LogFormat::Json,
        }
    }

    /// Validate logging configuration
    pub fn validate(&self) -> crate::errors::AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let levels = std::iter::once(&self.log_level).chain(self.preprocessing_log_level.iter());
        for level in levels {
            if !valid_levels.contains(&level.to_lowercase().as_str()) {
                return Err(crate::errors::AppError::Config(format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    level,
                    valid_levels.join(", ")
                )));
            }
        }
        Ok(())
    }
}
