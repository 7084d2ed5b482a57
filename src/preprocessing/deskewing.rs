//! # Image Deskewing Module
//!
//! This module detects rotational skew from straight lines in the edge map
//! (Hough transform) and rotates the page back onto the horizontal. The
//! output canvas grows so no corner is clipped.

use image::{GrayImage, Luma};
use imageproc::edges::canny;
use tracing;

use super::types::DeskewResult;
use crate::ocr_config::BorderMode;

/// Angles at or below this magnitude are left alone
pub const MIN_CORRECTION_DEGREES: f32 = 0.5;

/// Tuning of the Hough line search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughOptions {
    /// Minimum accumulator votes for a line
    pub vote_threshold: u32,
    /// Angular resolution in degrees
    pub theta_step_degrees: f32,
    /// Number of strongest lines the median is taken over
    pub max_lines: usize,
}

impl Default for HoughOptions {
    fn default() -> Self {
        Self {
            vote_threshold: 100,
            theta_step_degrees: 0.5,
            max_lines: 10,
        }
    }
}

/// A peak of the Hough accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLine {
    /// Normal angle in degrees, [0, 180)
    pub theta_degrees: f32,
    /// Signed distance from the origin in pixels
    pub rho: f32,
    pub votes: u32,
}

impl HoughLine {
    /// Rotation of the line away from the nearest axis, in (-45, 45].
    ///
    /// Horizontal lines have a normal of 90 degrees; vertical lines fold onto
    /// the same range so both families agree on the page rotation.
    pub fn skew_degrees(&self) -> f32 {
        let raw = self.theta_degrees - 90.0;
        let folded = (raw + 45.0).rem_euclid(90.0) - 45.0;
        if folded <= -45.0 {
            folded + 90.0
        } else {
            folded
        }
    }
}

/// Detects and corrects page skew.
///
/// The median skew of at most the ten strongest lines is taken as the page
/// angle; the page is rotated by its negative only when the magnitude exceeds
/// 0.5 degrees. A page without detectable lines is returned unchanged.
///
/// # Arguments
///
/// * `image` - Grayscale page raster
/// * `border` - Fill policy for pixels exposed by the rotation
///
/// # Examples
///
/// ```no_run
/// use doc_quality::ocr_config::BorderMode;
/// use doc_quality::preprocessing::deskew_image;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let page = image::open("tilted_scan.png")?.to_luma8();
/// let result = deskew_image(&page, BorderMode::Replicate);
/// println!("Detected skew: {:?}", result.skew_angle_degrees);
/// # Ok(())
/// # }
/// ```
pub fn deskew_image(image: &GrayImage, border: BorderMode) -> DeskewResult {
    deskew_image_with_options(image, border, &HoughOptions::default())
}

/// [`deskew_image`] with explicit Hough tuning.
pub fn deskew_image_with_options(
    image: &GrayImage,
    border: BorderMode,
    options: &HoughOptions,
) -> DeskewResult {
    let start_time = std::time::Instant::now();

    let lines = detect_lines(image, options);
    let Some(skew_angle) = median_skew(&lines) else {
        tracing::debug!(
            target: "docqa_preprocessing",
            "No lines detected, skipping deskewing"
        );
        return DeskewResult {
            image: image.clone(),
            skew_angle_degrees: None,
            rotated: false,
            lines_used: 0,
            processing_time_ms: start_time.elapsed().as_millis() as u32,
        };
    };

    // Small angles are left alone to avoid resampling artifacts
    if skew_angle.abs() <= MIN_CORRECTION_DEGREES {
        tracing::debug!(
            target: "docqa_preprocessing",
            "Skew angle {:.2}° is below threshold, skipping deskewing",
            skew_angle
        );
        return DeskewResult {
            image: image.clone(),
            skew_angle_degrees: Some(skew_angle),
            rotated: false,
            lines_used: lines.len(),
            processing_time_ms: start_time.elapsed().as_millis() as u32,
        };
    }

    let rotated = rotate_image(image, -skew_angle, border);
    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "docqa_preprocessing",
        "Deskewing completed in {}ms: corrected {:.2}° skew from {} lines",
        processing_time.as_millis(),
        skew_angle,
        lines.len()
    );

    DeskewResult {
        image: rotated,
        skew_angle_degrees: Some(skew_angle),
        rotated: true,
        lines_used: lines.len(),
        processing_time_ms: processing_time.as_millis() as u32,
    }
}

/// Estimates the page skew in degrees, or `None` when no lines are found.
pub fn detect_skew_angle(image: &GrayImage, options: &HoughOptions) -> Option<f32> {
    median_skew(&detect_lines(image, options))
}

fn median_skew(lines: &[HoughLine]) -> Option<f32> {
    if lines.is_empty() {
        return None;
    }
    let mut angles: Vec<f32> = lines.iter().map(HoughLine::skew_degrees).collect();
    angles.sort_by(|a, b| a.total_cmp(b));
    let mid = angles.len() / 2;
    Some(if angles.len() % 2 == 0 {
        (angles[mid - 1] + angles[mid]) / 2.0
    } else {
        angles[mid]
    })
}

/// Returns the strongest lines of the edge map, strongest first.
///
/// Peaks are local maxima of the (rho, theta) accumulator with at least
/// `vote_threshold` votes; each peak angle is refined by a parabolic fit over
/// its angular neighbours.
pub fn detect_lines(image: &GrayImage, options: &HoughOptions) -> Vec<HoughLine> {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 || options.theta_step_degrees <= 0.0 {
        return Vec::new();
    }

    let edges = canny(image, 50.0, 150.0);

    let theta_bins = (180.0 / options.theta_step_degrees).round().max(1.0) as usize;
    let max_rho = ((width as f32).hypot(height as f32)).ceil() as i32;
    let rho_bins = (2 * max_rho + 1) as usize;

    let trig: Vec<(f32, f32)> = (0..theta_bins)
        .map(|t| (t as f32 * options.theta_step_degrees).to_radians().sin_cos())
        .collect();

    let mut accumulator = vec![0u32; theta_bins * rho_bins];
    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        let (fx, fy) = (x as f32, y as f32);
        for (t, (sin, cos)) in trig.iter().enumerate() {
            let rho = (fx * cos + fy * sin).round() as i32 + max_rho;
            accumulator[t * rho_bins + rho as usize] += 1;
        }
    }

    let votes = |t: isize, r: isize| -> u32 {
        let t = t.rem_euclid(theta_bins as isize) as usize;
        if r < 0 || r >= rho_bins as isize {
            return 0;
        }
        accumulator[t * rho_bins + r as usize]
    };

    let mut peaks = Vec::new();
    for t in 0..theta_bins as isize {
        for r in 0..rho_bins as isize {
            let v = votes(t, r);
            if v < options.vote_threshold {
                continue;
            }
            // Strict maximum against earlier neighbours breaks plateau ties
            let is_peak = (-1..=1).all(|dt| {
                (-1..=1).all(|dr| {
                    if dt == 0 && dr == 0 {
                        return true;
                    }
                    let n = votes(t + dt, r + dr);
                    if (dt, dr) < (0, 0) {
                        v > n
                    } else {
                        v >= n
                    }
                })
            });
            if !is_peak {
                continue;
            }

            let (prev, next) = (votes(t - 1, r) as f32, votes(t + 1, r) as f32);
            let denominator = prev - 2.0 * v as f32 + next;
            let offset = if denominator.abs() > f32::EPSILON {
                (0.5 * (prev - next) / denominator).clamp(-0.5, 0.5)
            } else {
                0.0
            };

            peaks.push(HoughLine {
                theta_degrees: (t as f32 + offset) * options.theta_step_degrees,
                rho: (r - max_rho as isize) as f32,
                votes: v,
            });
        }
    }

    peaks.sort_by(|a, b| b.votes.cmp(&a.votes));
    peaks.truncate(options.max_lines);
    peaks
}

/// Rotates `image` by `angle_degrees` about its centre with bicubic resampling.
///
/// Positive angles turn the content clockwise on screen (x towards y). The
/// canvas is enlarged to the rotated bounding box.
pub fn rotate_image(image: &GrayImage, angle_degrees: f32, border: BorderMode) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let (sin, cos) = (angle_degrees as f64).to_radians().sin_cos();
    let (w, h) = (width as f64, height as f64);
    let new_width = (w * cos.abs() + h * sin.abs()).ceil().max(1.0) as u32;
    let new_height = (w * sin.abs() + h * cos.abs()).ceil().max(1.0) as u32;

    let (cx_in, cy_in) = ((w - 1.0) / 2.0, (h - 1.0) / 2.0);
    let (cx_out, cy_out) = ((new_width as f64 - 1.0) / 2.0, (new_height as f64 - 1.0) / 2.0);

    GrayImage::from_fn(new_width, new_height, |x, y| {
        let (dx, dy) = (x as f64 - cx_out, y as f64 - cy_out);
        // Inverse rotation back into source coordinates
        let src_x = cos * dx + sin * dy + cx_in;
        let src_y = -sin * dx + cos * dy + cy_in;
        Luma([sample_bicubic(image, src_x, src_y, border)])
    })
}

fn cubic_weight(t: f64) -> f64 {
    // Keys kernel, a = -0.5
    let t = t.abs();
    if t <= 1.0 {
        1.5 * t.powi(3) - 2.5 * t.powi(2) + 1.0
    } else if t < 2.0 {
        -0.5 * t.powi(3) + 2.5 * t.powi(2) - 4.0 * t + 2.0
    } else {
        0.0
    }
}

fn sample_bicubic(image: &GrayImage, x: f64, y: f64, border: BorderMode) -> u8 {
    let (width, height) = image.dimensions();
    let (max_x, max_y) = ((width - 1) as f64, (height - 1) as f64);

    if let BorderMode::Constant(fill) = border {
        if x < -0.5 || y < -0.5 || x > max_x + 0.5 || y > max_y + 0.5 {
            return fill;
        }
    }

    let (x0, y0) = (x.floor(), y.floor());
    let mut total = 0.0;
    for j in -1..=2 {
        let sy = y0 + j as f64;
        let wy = cubic_weight(y - sy);
        let py = sy.clamp(0.0, max_y) as u32;
        for i in -1..=2 {
            let sx = x0 + i as f64;
            let wx = cubic_weight(x - sx);
            let px = sx.clamp(0.0, max_x) as u32;
            total += wx * wy * image.get_pixel(px, py)[0] as f64;
        }
    }
    total.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_horizontal_lines_image(width: u32, height: u32, line_spacing: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if x >= 20 && x < width - 20 && y >= 20 && (y - 20) % line_spacing < 3 && y < height - 20 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_skew_degrees_folds_axes() {
        let line = |theta| HoughLine { theta_degrees: theta, rho: 0.0, votes: 1 };
        assert!((line(90.0).skew_degrees()).abs() < 1e-6);
        assert!((line(93.0).skew_degrees() - 3.0).abs() < 1e-5);
        assert!((line(87.0).skew_degrees() + 3.0).abs() < 1e-5);
        // Vertical lines agree with horizontal ones
        assert!((line(3.0).skew_degrees() - 3.0).abs() < 1e-5);
        assert!((line(177.0).skew_degrees() + 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_median_skew_is_robust_to_outliers() {
        let lines: Vec<HoughLine> = [92.0, 92.0, 92.5, 120.0, 92.0]
            .iter()
            .map(|&t| HoughLine { theta_degrees: t, rho: 0.0, votes: 200 })
            .collect();
        assert!((median_skew(&lines).unwrap() - 2.0).abs() < 1e-5);
        assert!(median_skew(&[]).is_none());
    }

    #[test]
    fn test_uniform_image_has_no_lines() {
        let img = GrayImage::from_pixel(100, 100, Luma([128]));
        let result = deskew_image(&img, BorderMode::Replicate);
        assert!(result.skew_angle_degrees.is_none());
        assert!(!result.rotated);
        assert_eq!(result.image, img);
    }

    #[test]
    fn test_horizontal_lines_are_not_rotated() {
        let img = create_horizontal_lines_image(300, 200, 30);
        let result = deskew_image(&img, BorderMode::Replicate);
        assert!(!result.rotated);
        assert_eq!(result.image, img);
        let angle = result.skew_angle_degrees.unwrap();
        assert!(angle.abs() <= MIN_CORRECTION_DEGREES);
    }

    #[test]
    fn test_rotation_expands_canvas() {
        let img = GrayImage::from_pixel(100, 50, Luma([255]));
        let rotated = rotate_image(&img, 30.0, BorderMode::Replicate);
        assert!(rotated.width() > 100);
        assert!(rotated.height() > 50);
        // Replicated white border stays white
        assert!(rotated.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_constant_border_fills_corners() {
        let img = GrayImage::from_pixel(100, 50, Luma([255]));
        let rotated = rotate_image(&img, 30.0, BorderMode::Constant(0));
        assert_eq!(rotated.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_zero_rotation_preserves_pixels() {
        let img = GrayImage::from_fn(20, 10, |x, y| Luma([(x * 10 + y) as u8]));
        let rotated = rotate_image(&img, 0.0, BorderMode::Replicate);
        assert_eq!(rotated, img);
    }

    #[test]
    fn test_detects_synthetic_skew() {
        let img = rotate_image(
            &create_horizontal_lines_image(400, 300, 30),
            4.0,
            BorderMode::Constant(255),
        );
        let angle = detect_skew_angle(&img, &HoughOptions::default()).unwrap();
        assert!((angle - 4.0).abs() < 0.5, "detected {}", angle);
    }
}
