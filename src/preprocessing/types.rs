//! # Shared Types for Image Preprocessing
//!
//! This module contains the shared result structs, enums and error type used
//! across the preprocessing sub-modules.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Errors raised by preprocessing primitives called with invalid parameters.
///
/// The enhancement pipeline validates its configuration up front, so these
/// only reach callers that use the primitives directly.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessingError {
    /// A parameter is outside its accepted range
    InvalidParameter { name: &'static str, message: String },
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::InvalidParameter { name, message } => {
                write!(f, "Invalid {}: {}", name, message)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// Image-level quality estimate. Every field lies in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Laplacian variance, normalized (higher is sharper)
    pub sharpness: f32,
    /// Intensity standard deviation, normalized (higher is better)
    pub contrast: f32,
    /// Exposure score peaking at mid-gray mean
    pub brightness: f32,
    /// Mean deviation from a median-filtered copy (higher is noisier)
    pub noise: f32,
    /// Weighted combination of the above with noise inverted
    pub composite: f32,
}

/// Enhancement stages in the order the pipeline applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Grayscale,
    Perspective,
    Deskew,
    Denoise,
    Contrast,
    Binarize,
    Morphology,
}

/// Result of perspective rectification.
#[derive(Debug, Clone)]
pub struct PerspectiveResult {
    /// The rectified image, or a copy of the input when no page quad was found
    pub image: GrayImage,
    /// Ordered corners (top-left, top-right, bottom-right, bottom-left) when found
    pub corners: Option<[(f32, f32); 4]>,
    /// Whether a warp was applied
    pub corrected: bool,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of deskewing operation.
#[derive(Debug, Clone)]
pub struct DeskewResult {
    /// The deskewed image
    pub image: GrayImage,
    /// Detected skew angle in degrees; `None` when no lines were found
    pub skew_angle_degrees: Option<f32>,
    /// Whether a rotation was applied
    pub rotated: bool,
    /// Number of Hough lines the estimate was taken over
    pub lines_used: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of edge-preserving noise reduction.
#[derive(Debug, Clone)]
pub struct DenoisedImageResult {
    /// The denoised image
    pub image: GrayImage,
    /// Range sigma used by the bilateral filter
    pub range_sigma: f32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of CLAHE contrast enhancement operation.
#[derive(Debug, Clone)]
pub struct ClaheImageResult {
    /// The contrast-enhanced image
    pub image: GrayImage,
    /// Clip limit used for histogram clipping
    pub clip_limit: f32,
    /// Number of tiles along each axis
    pub tile_grid: (u32, u32),
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of adaptive thresholding.
#[derive(Debug, Clone)]
pub struct ThresholdedImageResult {
    /// The binary image (0 or 255)
    pub image: GrayImage,
    /// Neighborhood size used
    pub block_size: u32,
    /// Constant subtracted from the local mean
    pub constant: f32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of morphological operations on binary images.
#[derive(Debug, Clone)]
pub struct MorphologicalImageResult {
    /// The morphologically processed image
    pub image: GrayImage,
    /// Type of morphological operation applied
    pub operation: MorphologicalOperation,
    /// Kernel size used (e.g., 3 for 3x3 kernel)
    pub kernel_size: u32,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Types of morphological operations.
///
/// Operations act on dark foreground (ink) over a light background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphologicalOperation {
    /// Shrinks ink strokes
    Erosion,
    /// Thickens ink strokes
    Dilation,
    /// Erosion then dilation; removes isolated specks
    Opening,
    /// Dilation then erosion; reconnects broken strokes
    Closing,
    /// Opening followed by closing
    Cleanup,
}
