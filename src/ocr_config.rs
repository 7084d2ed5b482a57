//! # Processing Configuration Module
//!
//! This module defines the configuration structures consumed by the quality
//! pipeline: which enhancement stages run, how the recognition engine is
//! driven, and how many attempts a page may take before the best one wins.

use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

// Constants for processing configuration
pub const DEFAULT_LANGUAGE: &str = "spa";
pub const DEFAULT_DPI: u32 = 300;
pub const DEFAULT_MIN_QUALITY: f32 = 60.0;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DOCUMENT_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_BLOCK_SIZE: u32 = 11;
pub const DEFAULT_BINARIZATION_CONSTANT: f32 = 2.0;
pub const DEFAULT_DENOISE_STRENGTH: f32 = 30.0;
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024; // 50MB limit for input documents
pub const FORMAT_DETECTION_BUFFER_SIZE: usize = 32;
pub const MIN_FORMAT_BYTES: usize = 8;

/// Fill policy for pixels exposed when a page is rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BorderMode {
    /// Copy the nearest edge pixel outward
    #[default]
    Replicate,
    /// Fill with a fixed intensity
    Constant(u8),
}

/// Independently toggleable enhancement stages and their parameters.
///
/// A config with every flag false is a valid passthrough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementConfig {
    pub enable_deskew: bool,
    pub enable_denoise: bool,
    pub enable_contrast_enhancement: bool,
    pub enable_perspective_correction: bool,
    pub enable_binarization: bool,
    pub enable_morphology: bool,
    /// Neighborhood size for adaptive thresholding (odd, >= 3)
    pub binarization_block_size: u32,
    /// Offset subtracted from the local mean before thresholding
    pub binarization_constant: f32,
    /// Range sigma of the edge-preserving denoiser
    pub denoise_strength: f32,
    /// Fill policy for rotation
    pub border_mode: BorderMode,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            enable_deskew: true,
            enable_denoise: true,
            enable_contrast_enhancement: true,
            enable_perspective_correction: false,
            enable_binarization: true,
            enable_morphology: true,
            binarization_block_size: DEFAULT_BLOCK_SIZE,
            binarization_constant: DEFAULT_BINARIZATION_CONSTANT,
            denoise_strength: DEFAULT_DENOISE_STRENGTH,
            border_mode: BorderMode::Replicate,
        }
    }
}

impl EnhancementConfig {
    /// Every stage disabled; the pipeline returns its input untouched.
    pub fn passthrough() -> Self {
        Self {
            enable_deskew: false,
            enable_denoise: false,
            enable_contrast_enhancement: false,
            enable_perspective_correction: false,
            enable_binarization: false,
            enable_morphology: false,
            ..Self::default()
        }
    }

    /// Returns true when no stage is enabled.
    pub fn is_passthrough(&self) -> bool {
        !(self.enable_deskew
            || self.enable_denoise
            || self.enable_contrast_enhancement
            || self.enable_perspective_correction
            || self.enable_binarization
            || self.enable_morphology)
    }

    /// Validate enhancement parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.binarization_block_size < 3 {
            return Err(AppError::Config(format!(
                "binarization_block_size ({}) must be at least 3",
                self.binarization_block_size
            )));
        }
        if self.binarization_block_size % 2 == 0 {
            return Err(AppError::Config(format!(
                "binarization_block_size ({}) must be odd",
                self.binarization_block_size
            )));
        }
        if !self.binarization_constant.is_finite() {
            return Err(AppError::Config(
                "binarization_constant must be a finite number".to_string(),
            ));
        }
        if !(self.denoise_strength > 0.0 && self.denoise_strength.is_finite()) {
            return Err(AppError::Config(
                "denoise_strength must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Recognition engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Tesseract language code(s), e.g. "spa" or "spa+eng"
    pub language: String,
    /// Source resolution reported to the engine
    pub dpi: u32,
    /// Directory holding traineddata files; engine default when absent
    pub tessdata_path: Option<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            dpi: DEFAULT_DPI,
            tessdata_path: None,
        }
    }
}

impl RecognitionConfig {
    /// Validate recognition configuration parameters
    pub fn validate(&self) -> AppResult<()> {
        if self.language.trim().is_empty() {
            return Err(AppError::Config("language cannot be empty".to_string()));
        }
        for code in self.language.split('+') {
            if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(AppError::Config(format!(
                    "Invalid language code '{}' in '{}'",
                    code, self.language
                )));
            }
        }
        if !(72..=1200).contains(&self.dpi) {
            return Err(AppError::Config(format!(
                "dpi ({}) must be between 72 and 1200",
                self.dpi
            )));
        }
        Ok(())
    }
}

/// Retry/acceptance policy for the quality-driven loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Acceptance threshold on a 0-100 scale
    pub min_quality_threshold: f32,
    /// Upper bound on recognition calls per page
    pub max_attempts: u32,
    /// Wall-clock budget per document in seconds
    pub document_timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_quality_threshold: DEFAULT_MIN_QUALITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            document_timeout_secs: DEFAULT_DOCUMENT_TIMEOUT_SECS, // 30 minutes
        }
    }
}

impl RetryPolicy {
    /// The acceptance threshold mapped onto [0, 1].
    pub fn threshold_fraction(&self) -> f32 {
        (self.min_quality_threshold / 100.0).clamp(0.0, 1.0)
    }

    /// Validate retry policy parameters
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=100.0).contains(&self.min_quality_threshold) {
            return Err(AppError::Config(format!(
                "min_quality_threshold ({}) must be between 0 and 100",
                self.min_quality_threshold
            )));
        }
        if self.max_attempts == 0 {
            return Err(AppError::Config(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.document_timeout_secs == 0 {
            return Err(AppError::Config(
                "document_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Named presets trading speed against output quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityProfile {
    MaximumQuality,
    FastProcessing,
    #[default]
    Balanced,
}

impl QualityProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityProfile::MaximumQuality => "maximum_quality",
            QualityProfile::FastProcessing => "fast_processing",
            QualityProfile::Balanced => "balanced",
        }
    }

    /// Overwrites the profile-controlled fields of the given settings.
    pub fn apply(
        &self,
        recognition: &mut RecognitionConfig,
        retry: &mut RetryPolicy,
        enhancement: &mut EnhancementConfig,
    ) {
        match self {
            QualityProfile::MaximumQuality => {
                recognition.dpi = 600;
                retry.min_quality_threshold = 80.0;
                retry.document_timeout_secs = 3600;
                enhancement.enable_deskew = true;
                enhancement.enable_denoise = true;
                enhancement.enable_contrast_enhancement = true;
                enhancement.enable_perspective_correction = true;
                enhancement.enable_binarization = true;
                enhancement.enable_morphology = true;
            }
            QualityProfile::FastProcessing => {
                recognition.dpi = 150;
                retry.min_quality_threshold = 50.0;
                retry.max_attempts = 1;
                retry.document_timeout_secs = 600;
                enhancement.enable_deskew = false;
                enhancement.enable_denoise = false;
                enhancement.enable_contrast_enhancement = true;
                enhancement.enable_perspective_correction = false;
            }
            QualityProfile::Balanced => {
                recognition.dpi = DEFAULT_DPI;
                retry.min_quality_threshold = DEFAULT_MIN_QUALITY;
                retry.document_timeout_secs = DEFAULT_DOCUMENT_TIMEOUT_SECS;
            }
        }
    }
}

impl std::str::FromStr for QualityProfile {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "maximum_quality" => Ok(QualityProfile::MaximumQuality),
            "fast_processing" => Ok(QualityProfile::FastProcessing),
            "balanced" => Ok(QualityProfile::Balanced),
            other => Err(AppError::Config(format!(
                "Unknown quality profile '{}'. Expected one of: maximum_quality, fast_processing, balanced",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_enhancement_config_is_valid() {
        let config = EnhancementConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.enable_perspective_correction);
        assert_eq!(config.border_mode, BorderMode::Replicate);
    }

    #[test]
    fn test_passthrough_has_no_stages() {
        let config = EnhancementConfig::passthrough();
        assert!(config.is_passthrough());
        assert!(config.validate().is_ok());
        assert!(!EnhancementConfig::default().is_passthrough());
    }

    #[test]
    fn test_enhancement_block_size_validation() {
        let mut config = EnhancementConfig::default();

        // Invalid: even block size
        config.binarization_block_size = 10;
        assert!(config.validate().is_err());

        // Invalid: too small
        config.binarization_block_size = 1;
        assert!(config.validate().is_err());

        config.binarization_block_size = 15;
        assert!(config.validate().is_ok());

        // Invalid: non-positive strength
        config.denoise_strength = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recognition_config_validation() {
        let mut config = RecognitionConfig::default();
        assert!(config.validate().is_ok());

        config.language = "spa+eng".to_string();
        assert!(config.validate().is_ok());

        config.language = "spa+".to_string();
        assert!(config.validate().is_err());

        config.language = "spa".to_string();
        config.dpi = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_threshold_fraction() {
        let policy = RetryPolicy::default();
        assert!((policy.threshold_fraction() - 0.6).abs() < 1e-6);
        assert!(policy.validate().is_ok());

        let zero = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(zero.validate().is_err());

        let too_high = RetryPolicy {
            min_quality_threshold: 120.0,
            ..RetryPolicy::default()
        };
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn test_quality_profile_parsing() {
        assert_eq!(
            "maximum_quality".parse::<QualityProfile>().unwrap(),
            QualityProfile::MaximumQuality
        );
        assert_eq!(
            " Fast_Processing ".parse::<QualityProfile>().unwrap(),
            QualityProfile::FastProcessing
        );
        assert!("turbo".parse::<QualityProfile>().is_err());
    }

    #[test]
    fn test_fast_profile_disables_retries() {
        let mut recognition = RecognitionConfig::default();
        let mut retry = RetryPolicy::default();
        let mut enhancement = EnhancementConfig::default();
        QualityProfile::FastProcessing.apply(&mut recognition, &mut retry, &mut enhancement);

        assert_eq!(recognition.dpi, 150);
        assert_eq!(retry.max_attempts, 1);
        assert!(!enhancement.enable_deskew);
        assert!(enhancement.enable_contrast_enhancement);
    }

    #[test]
    fn test_maximum_profile_enables_everything() {
        let mut recognition = RecognitionConfig::default();
        let mut retry = RetryPolicy::default();
        let mut enhancement = EnhancementConfig::passthrough();
        QualityProfile::MaximumQuality.apply(&mut recognition, &mut retry, &mut enhancement);

        assert_eq!(recognition.dpi, 600);
        assert!((retry.min_quality_threshold - 80.0).abs() < f32::EPSILON);
        assert!(enhancement.enable_perspective_correction);
        assert!(!enhancement.is_passthrough());
    }
}
