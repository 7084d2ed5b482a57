//! # Image Thresholding Module
//!
//! Adaptive (local mean) binarization. Each pixel is compared against the
//! mean of its own neighbourhood, so uneven illumination across a page does
//! not wash out text the way a single global threshold does.

use image::{GrayImage, Luma};
use tracing;

use super::types::{PreprocessingError, ThresholdedImageResult};

/// Converts a grayscale page to black text on white using a local mean threshold.
///
/// A pixel becomes white when its value exceeds the mean of the surrounding
/// `block_size` x `block_size` window minus `constant`, black otherwise.
/// Windows are clipped at the image border.
///
/// # Arguments
///
/// * `image` - Grayscale input
/// * `block_size` - Odd window size, at least 3 (default 11)
/// * `constant` - Offset subtracted from the local mean (default 2)
///
/// # Returns
///
/// Returns a `Result` containing the binary image and metadata, or a `PreprocessingError`
///
/// # Examples
///
/// ```no_run
/// use doc_quality::preprocessing::apply_adaptive_threshold;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let page = image::open("shadowed_page.jpg")?.to_luma8();
/// let binary = apply_adaptive_threshold(&page, 11, 2.0)?;
/// # Ok(())
/// # }
/// ```
pub fn apply_adaptive_threshold(
    image: &GrayImage,
    block_size: u32,
    constant: f32,
) -> Result<ThresholdedImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    if block_size < 3 || block_size % 2 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "block_size",
            message: format!("{} must be odd and at least 3", block_size),
        });
    }

    let (width, height) = image.dimensions();
    let integral = integral_image(image);
    let stride = width as usize + 1;
    let radius = block_size / 2;

    let output = GrayImage::from_fn(width, height, |x, y| {
        let x0 = x.saturating_sub(radius) as usize;
        let y0 = y.saturating_sub(radius) as usize;
        let x1 = (x + radius + 1).min(width) as usize;
        let y1 = (y + radius + 1).min(height) as usize;

        let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
            - integral[y0 * stride + x1]
            - integral[y1 * stride + x0];
        let count = ((x1 - x0) * (y1 - y0)) as f64;
        let threshold = sum as f64 / count - constant as f64;

        if image.get_pixel(x, y)[0] as f64 > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "docqa_preprocessing",
        "Adaptive thresholding completed in {}ms: block_size={}, constant={}, dimensions={}x{}",
        processing_time.as_millis(),
        block_size,
        constant,
        width,
        height
    );

    Ok(ThresholdedImageResult {
        image: output,
        block_size,
        constant,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Summed-area table with a zero first row and column.
fn integral_image(image: &GrayImage) -> Vec<u64> {
    let (width, height) = image.dimensions();
    let stride = width as usize + 1;
    let mut table = vec![0u64; stride * (height as usize + 1)];

    for y in 0..height as usize {
        let mut row_sum = 0u64;
        for x in 0..width as usize {
            row_sum += image.get_pixel(x as u32, y as u32)[0] as u64;
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}
