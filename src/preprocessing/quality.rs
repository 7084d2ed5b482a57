//! # Image Quality Assessment Module
//!
//! Scores how recognition-friendly a raster is from four cheap statistics:
//! sharpness, contrast, exposure and noise. The composite drives the retry
//! decision alongside the text-level score.

use image::GrayImage;
use imageproc::filter::median_filter;
use tracing;

use super::types::QualityMetrics;
use crate::raster::Raster;

const SHARPNESS_WEIGHT: f32 = 0.4;
const CONTRAST_WEIGHT: f32 = 0.3;
const BRIGHTNESS_WEIGHT: f32 = 0.2;
const NOISE_WEIGHT: f32 = 0.1;

/// Scale constants mapping raw statistics onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageQualityAssessor {
    /// Laplacian variance that counts as fully sharp
    pub sharpness_scale: f64,
    /// Multiplier on the normalized standard deviation
    pub contrast_factor: f64,
    /// Mean absolute median residual that counts as fully noisy
    pub noise_scale: f64,
}

impl Default for ImageQualityAssessor {
    fn default() -> Self {
        Self {
            sharpness_scale: 1000.0,
            contrast_factor: 4.0,
            noise_scale: 50.0,
        }
    }
}

impl ImageQualityAssessor {
    /// Scores a raster. Colour input is converted to luma first.
    ///
    /// Never fails: empty and uniform rasters produce boundary scores.
    pub fn assess(&self, raster: &Raster) -> QualityMetrics {
        match raster {
            Raster::Gray(gray) => self.assess_gray(gray),
            Raster::Rgb(_) => self.assess_gray(&raster.to_gray()),
        }
    }

    pub fn assess_gray(&self, image: &GrayImage) -> QualityMetrics {
        let start_time = std::time::Instant::now();

        if image.width() == 0 || image.height() == 0 {
            return QualityMetrics::default();
        }

        let (mean, std_dev) = mean_and_std(image);
        let sharpness = clamp_unit(laplacian_variance(image) / self.sharpness_scale);
        let contrast = clamp_unit(std_dev / 255.0 * self.contrast_factor);
        let brightness = clamp_unit(1.0 - 2.0 * (mean / 255.0 - 0.5).abs());
        let noise = clamp_unit(median_residual(image) / self.noise_scale);

        let composite = (sharpness * SHARPNESS_WEIGHT
            + contrast * CONTRAST_WEIGHT
            + brightness * BRIGHTNESS_WEIGHT
            + (1.0 - noise) * NOISE_WEIGHT)
            .clamp(0.0, 1.0);

        tracing::debug!(
            target: "docqa_preprocessing",
            "Quality assessment completed in {}ms: composite={:.3}, sharpness={:.3}, contrast={:.3}, brightness={:.3}, noise={:.3}",
            start_time.elapsed().as_millis(),
            composite,
            sharpness,
            contrast,
            brightness,
            noise
        );

        QualityMetrics {
            sharpness,
            contrast,
            brightness,
            noise,
            composite,
        }
    }
}

/// Scores a raster with the default scale constants.
pub fn assess_image_quality(raster: &Raster) -> QualityMetrics {
    ImageQualityAssessor::default().assess(raster)
}

fn clamp_unit(value: f64) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0) as f32
    } else {
        0.0
    }
}

fn mean_and_std(image: &GrayImage) -> (f64, f64) {
    let count = (image.width() as f64) * (image.height() as f64);
    if count == 0.0 {
        return (0.0, 0.0);
    }
    let (sum, sum_sq) = image.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
        let v = p[0] as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / count;
    let variance = (sum_sq / count - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| image.get_pixel(x, y)[0] as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let laplacian = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += laplacian;
            sum_sq += laplacian * laplacian;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}

/// Mean absolute difference from a 5x5 median-filtered copy.
fn median_residual(image: &GrayImage) -> f64 {
    let median = median_filter(image, 2, 2);
    let total: u64 = image
        .pixels()
        .zip(median.pixels())
        .map(|(a, b)| a[0].abs_diff(b[0]) as u64)
        .sum();
    total as f64 / (image.width() as f64 * image.height() as f64)
}
