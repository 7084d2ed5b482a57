//! # Unified Application Configuration
//!
//! This module consolidates every setting of a processing run into a single
//! [`AppConfig`]. It loads from environment variables (after `.env`), applies
//! the selected quality profile, and validates the result before any engine
//! is constructed. Input and output directories live here rather than in
//! module-level constants so every caller passes them explicitly.

use crate::errors::{AppError, AppResult};
use crate::observability_config::LoggingConfig;
use crate::ocr_config::{
    EnhancementConfig, QualityProfile, RecognitionConfig, RetryPolicy, MAX_FILE_SIZE,
};
use std::path::PathBuf;
use std::str::FromStr;

/// Complete configuration of a processing run
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Recognition engine settings
    pub recognition: RecognitionConfig,
    /// Acceptance threshold, attempt bound and document timeout
    pub retry: RetryPolicy,
    /// Initial enhancement stages for the first attempt
    pub enhancement: EnhancementConfig,
    /// Profile the settings were derived from
    pub profile: QualityProfile,
    /// Whether tables are extracted alongside text
    pub enable_table_extraction: bool,
    /// Where `--all` looks for documents
    pub input_dir: PathBuf,
    /// Where results are written
    pub output_dir: PathBuf,
    /// Upper bound on input file size in bytes
    pub max_file_size: u64,
    /// Pages recognised concurrently
    pub worker_threads: usize,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recognition: RecognitionConfig::default(),
            retry: RetryPolicy::default(),
            enhancement: EnhancementConfig::default(),
            profile: QualityProfile::Balanced,
            enable_table_extraction: true,
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            max_file_size: MAX_FILE_SIZE,
            worker_threads: default_worker_threads(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .min(8)
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    what: &str,
) -> AppResult<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AppError::Config(format!("{} must be {}", key, what))),
        None => Ok(None),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> AppResult<Option<bool>> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(AppError::Config(format!("{} must be true or false", key))),
        },
        None => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from environment variables (and `.env` when present)
    pub fn from_env() -> AppResult<Self> {
        Self::from_env_with_profile(None)
    }

    /// Like [`AppConfig::from_env`], with `profile` taking the place of
    /// `DOCQA_PROFILE` when given. Other variables still override the profile.
    pub fn from_env_with_profile(profile: Option<QualityProfile>) -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut config =
            Self::from_lookup_with_profile(|key| std::env::var(key).ok(), profile)?;
        config.logging = LoggingConfig::from_env();
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// The profile is applied first; explicit variables then override it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        Self::from_lookup_with_profile(lookup, None)
    }

    /// Build configuration from a key lookup with an optional profile override.
    pub fn from_lookup_with_profile(
        lookup: impl Fn(&str) -> Option<String>,
        profile: Option<QualityProfile>,
    ) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(profile) = profile {
            config.profile = profile;
        } else if let Some(profile) = lookup("DOCQA_PROFILE") {
            config.profile = QualityProfile::from_str(&profile)?;
        }
        config.profile.apply(
            &mut config.recognition,
            &mut config.retry,
            &mut config.enhancement,
        );

        // Recognition
        if let Some(language) = lookup("DOCQA_LANGUAGE") {
            config.recognition.language = language.trim().to_string();
        }
        if let Some(dpi) = parse_var(&lookup, "DOCQA_DPI", "a valid number")? {
            config.recognition.dpi = dpi;
        }
        if let Some(path) = lookup("DOCQA_TESSDATA") {
            config.recognition.tessdata_path = Some(path);
        }

        // Retry policy
        if let Some(threshold) = parse_var(&lookup, "DOCQA_MIN_QUALITY", "a number between 0 and 100")? {
            config.retry.min_quality_threshold = threshold;
        }
        if let Some(attempts) = parse_var(&lookup, "DOCQA_MAX_ATTEMPTS", "a valid number")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(timeout) = parse_var(&lookup, "DOCQA_TIMEOUT_SECS", "a valid number")? {
            config.retry.document_timeout_secs = timeout;
        }

        // Enhancement stage toggles
        let toggles: [(&str, &mut bool); 6] = [
            ("DOCQA_ENABLE_DESKEW", &mut config.enhancement.enable_deskew),
            ("DOCQA_ENABLE_DENOISE", &mut config.enhancement.enable_denoise),
            ("DOCQA_ENABLE_CONTRAST", &mut config.enhancement.enable_contrast_enhancement),
            ("DOCQA_ENABLE_PERSPECTIVE", &mut config.enhancement.enable_perspective_correction),
            ("DOCQA_ENABLE_BINARIZATION", &mut config.enhancement.enable_binarization),
            ("DOCQA_ENABLE_MORPHOLOGY", &mut config.enhancement.enable_morphology),
        ];
        for (key, flag) in toggles {
            if let Some(value) = parse_flag(&lookup, key)? {
                *flag = value;
            }
        }

        // Documents
        if let Some(enabled) = parse_flag(&lookup, "DOCQA_ENABLE_TABLES")? {
            config.enable_table_extraction = enabled;
        }
        if let Some(dir) = lookup("DOCQA_INPUT_DIR") {
            config.input_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("DOCQA_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(workers) = parse_var(&lookup, "DOCQA_WORKERS", "a valid number")? {
            config.worker_threads = workers;
        }

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.recognition.validate()?;
        self.retry.validate()?;
        self.enhancement.validate()?;
        self.logging.validate()?;

        if self.worker_threads == 0 {
            return Err(AppError::Config(
                "worker_threads must be greater than 0".to_string(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(AppError::Config(
                "max_file_size must be greater than 0".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(AppError::Config("output_dir cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: profile={}, language={}, dpi={}, min_quality={}, max_attempts={}, tables={}, output_dir={}",
            self.profile.as_str(),
            self.recognition.language,
            self.recognition.dpi,
            self.retry.min_quality_threshold,
            self.retry.max_attempts,
            self.enable_table_extraction,
            self.output_dir.display()
        )
    }
}
