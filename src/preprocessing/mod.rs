//! # Image Preprocessing Module
//!
//! Geometric and photometric normalization of page rasters ahead of
//! recognition, plus the image-level quality score.
//!
//! The module is organized into focused sub-modules:
//! - `perspective`: page outline detection and rectification
//! - `deskewing`: Hough-based skew detection and rotation
//! - `filtering`: bilateral denoising, CLAHE and morphology
//! - `thresholding`: adaptive local-mean binarization
//! - `quality`: sharpness/contrast/brightness/noise scoring
//! - `pipeline`: the configurable composition of the above
//! - `types`: shared result types and errors

pub mod deskewing;
pub mod filtering;
pub mod perspective;
pub mod pipeline;
pub mod quality;
pub mod thresholding;
pub mod types;

// Re-export commonly used types and functions for convenience
pub use types::{
    ClaheImageResult, DenoisedImageResult, DeskewResult, MorphologicalImageResult,
    MorphologicalOperation, PerspectiveResult, PreprocessingError, QualityMetrics, StageKind,
    ThresholdedImageResult,
};

pub use deskewing::{deskew_image, detect_skew_angle, rotate_image, HoughOptions};
pub use filtering::{apply_clahe, apply_morphological_operation, reduce_noise};
pub use perspective::{correct_perspective, find_page_quad};
pub use pipeline::{
    EnhancedPage, EnhancementPipeline, GeometricNormalizer, GeometricOutcome, PhotometricEnhancer,
};
pub use quality::{assess_image_quality, ImageQualityAssessor};
pub use thresholding::apply_adaptive_threshold;
