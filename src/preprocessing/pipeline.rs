//! # Enhancement Pipeline
//!
//! Threads a page raster through whichever stages an [`EnhancementConfig`]
//! enables, in a fixed order: grayscale, perspective, deskew, denoise,
//! contrast, binarize, morphology. Every stage returns a new image; the input
//! raster is never modified.

use image::GrayImage;
use tracing;

use super::deskewing::deskew_image;
use super::filtering::{
    apply_clahe, apply_morphological_operation, reduce_noise, DEFAULT_CLAHE_CLIP_LIMIT,
    DEFAULT_CLAHE_GRID,
};
use super::perspective::correct_perspective;
use super::thresholding::apply_adaptive_threshold;
use super::types::{MorphologicalOperation, StageKind};
use crate::ocr_config::{BorderMode, EnhancementConfig};
use crate::raster::Raster;

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct EnhancedPage {
    pub raster: Raster,
    /// Stages that actually changed the page, in order
    pub applied: Vec<StageKind>,
    /// Skew estimate when deskewing ran and found lines
    pub skew_angle_degrees: Option<f32>,
    pub perspective_corrected: bool,
}

/// Perspective rectification followed by skew correction.
#[derive(Debug, Clone, Copy)]
pub struct GeometricNormalizer {
    pub enable_perspective_correction: bool,
    pub enable_deskew: bool,
    pub border_mode: BorderMode,
}

/// What the geometric stages did to a page.
#[derive(Debug, Clone)]
pub struct GeometricOutcome {
    pub image: GrayImage,
    pub perspective_corrected: bool,
    pub skew_angle_degrees: Option<f32>,
    pub rotated: bool,
}

impl GeometricNormalizer {
    pub fn from_config(config: &EnhancementConfig) -> Self {
        Self {
            enable_perspective_correction: config.enable_perspective_correction,
            enable_deskew: config.enable_deskew,
            border_mode: config.border_mode,
        }
    }

    /// Applies the enabled geometric corrections. Never fails; a step that
    /// finds nothing to correct leaves the image as it was.
    pub fn normalize(&self, image: &GrayImage) -> GeometricOutcome {
        let mut outcome = GeometricOutcome {
            image: image.clone(),
            perspective_corrected: false,
            skew_angle_degrees: None,
            rotated: false,
        };

        if self.enable_perspective_correction {
            let result = correct_perspective(&outcome.image);
            outcome.perspective_corrected = result.corrected;
            outcome.image = result.image;
        }

        if self.enable_deskew {
            let result = deskew_image(&outcome.image, self.border_mode);
            outcome.skew_angle_degrees = result.skew_angle_degrees;
            outcome.rotated = result.rotated;
            outcome.image = result.image;
        }

        outcome
    }
}

/// Denoise, contrast, binarize and morphology stages.
#[derive(Debug, Clone, Copy)]
pub struct PhotometricEnhancer {
    pub enable_denoise: bool,
    pub enable_contrast_enhancement: bool,
    pub enable_binarization: bool,
    pub enable_morphology: bool,
    pub denoise_strength: f32,
    pub binarization_block_size: u32,
    pub binarization_constant: f32,
}

impl PhotometricEnhancer {
    pub fn from_config(config: &EnhancementConfig) -> Self {
        Self {
            enable_denoise: config.enable_denoise,
            enable_contrast_enhancement: config.enable_contrast_enhancement,
            enable_binarization: config.enable_binarization,
            enable_morphology: config.enable_morphology,
            denoise_strength: config.denoise_strength,
            binarization_block_size: config.binarization_block_size,
            binarization_constant: config.binarization_constant,
        }
    }

    /// Runs the enabled stages and reports which ones ran.
    ///
    /// A stage rejecting its parameters is skipped with a warning rather than
    /// failing the page.
    pub fn enhance(&self, image: &GrayImage) -> (GrayImage, Vec<StageKind>) {
        let mut current = image.clone();
        let mut applied = Vec::new();

        if self.enable_denoise {
            match reduce_noise(&current, self.denoise_strength) {
                Ok(result) => {
                    current = result.image;
                    applied.push(StageKind::Denoise);
                }
                Err(e) => tracing::warn!(target: "docqa_preprocessing", error = %e, "Skipping denoise stage"),
            }
        }

        if self.enable_contrast_enhancement {
            match apply_clahe(&current, DEFAULT_CLAHE_CLIP_LIMIT, DEFAULT_CLAHE_GRID) {
                Ok(result) => {
                    current = result.image;
                    applied.push(StageKind::Contrast);
                }
                Err(e) => tracing::warn!(target: "docqa_preprocessing", error = %e, "Skipping contrast stage"),
            }
        }

        if self.enable_binarization {
            match apply_adaptive_threshold(
                &current,
                self.binarization_block_size,
                self.binarization_constant,
            ) {
                Ok(result) => {
                    current = result.image;
                    applied.push(StageKind::Binarize);
                }
                Err(e) => tracing::warn!(target: "docqa_preprocessing", error = %e, "Skipping binarization stage"),
            }
        }

        if self.enable_morphology {
            current = apply_morphological_operation(&current, MorphologicalOperation::Cleanup).image;
            applied.push(StageKind::Morphology);
        }

        (current, applied)
    }
}

/// Composes the geometric and photometric stages under one configuration.
#[derive(Debug, Clone)]
pub struct EnhancementPipeline {
    config: EnhancementConfig,
}

impl EnhancementPipeline {
    pub fn new(config: EnhancementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    /// Produces the normalized page for one recognition attempt.
    ///
    /// With every stage disabled the returned raster is identical to the input,
    /// colour channels included.
    pub fn run(&self, raster: &Raster) -> EnhancedPage {
        let start_time = std::time::Instant::now();

        if self.config.is_passthrough() {
            return EnhancedPage {
                raster: raster.clone(),
                applied: Vec::new(),
                skew_angle_degrees: None,
                perspective_corrected: false,
            };
        }

        let mut applied = Vec::new();
        let gray = match raster {
            Raster::Gray(gray) => gray.clone(),
            Raster::Rgb(_) => {
                applied.push(StageKind::Grayscale);
                raster.to_gray()
            }
        };

        let geometric = GeometricNormalizer::from_config(&self.config).normalize(&gray);
        if geometric.perspective_corrected {
            applied.push(StageKind::Perspective);
        }
        if geometric.rotated {
            applied.push(StageKind::Deskew);
        }

        let (enhanced, photometric) =
            PhotometricEnhancer::from_config(&self.config).enhance(&geometric.image);
        applied.extend(photometric);

        tracing::debug!(
            target: "docqa_preprocessing",
            stages = ?applied,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Enhancement pipeline finished"
        );

        EnhancedPage {
            raster: Raster::Gray(enhanced),
            applied,
            skew_angle_degrees: geometric.skew_angle_degrees,
            perspective_corrected: geometric.perspective_corrected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn text_like_page() -> GrayImage {
        GrayImage::from_fn(120, 80, |x, y| {
            if (20..100).contains(&x) && y % 16 < 4 && y > 10 {
                Luma([15])
            } else {
                Luma([235])
            }
        })
    }

    #[test]
    fn test_passthrough_returns_identical_rgb() {
        let rgb = RgbImage::from_fn(9, 7, |x, y| Rgb([x as u8, y as u8, 42]));
        let raster = Raster::Rgb(rgb);
        let page = EnhancementPipeline::new(EnhancementConfig::passthrough()).run(&raster);
        assert_eq!(page.raster, raster);
        assert!(page.applied.is_empty());
    }

    #[test]
    fn test_color_input_is_converted_when_stages_run() {
        let raster = Raster::Rgb(RgbImage::from_pixel(20, 20, Rgb([200, 200, 200])));
        let config = EnhancementConfig {
            enable_contrast_enhancement: true,
            ..EnhancementConfig::passthrough()
        };
        let page = EnhancementPipeline::new(config).run(&raster);
        assert_eq!(page.raster.channels(), 1);
        assert_eq!(page.applied, vec![StageKind::Grayscale, StageKind::Contrast]);
    }

    #[test]
    fn test_default_config_binarizes() {
        let page = EnhancementPipeline::new(EnhancementConfig::default())
            .run(&Raster::Gray(text_like_page()));
        let Raster::Gray(out) = &page.raster else {
            panic!("expected grayscale output");
        };
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert!(page.applied.contains(&StageKind::Binarize));
        assert!(page.applied.contains(&StageKind::Morphology));
        assert!(!page.perspective_corrected);
    }

    #[test]
    fn test_geometric_normalizer_disabled_is_noop() {
        let img = text_like_page();
        let normalizer = GeometricNormalizer {
            enable_perspective_correction: false,
            enable_deskew: false,
            border_mode: BorderMode::Replicate,
        };
        let outcome = normalizer.normalize(&img);
        assert_eq!(outcome.image, img);
        assert!(!outcome.rotated);
    }

    #[test]
    fn test_photometric_enhancer_disabled_is_noop() {
        let img = text_like_page();
        let enhancer = PhotometricEnhancer::from_config(&EnhancementConfig::passthrough());
        let (out, applied) = enhancer.enhance(&img);
        assert_eq!(out, img);
        assert!(applied.is_empty());
    }
}
