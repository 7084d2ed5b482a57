//! # Image Filtering Module
//!
//! Photometric clean-up applied before recognition: edge-preserving noise
//! reduction, local contrast enhancement (CLAHE) and morphological clean-up
//! of binarized pages.

use image::{GrayImage, Luma};
use tracing;

use super::types::{
    ClaheImageResult, DenoisedImageResult, MorphologicalImageResult, MorphologicalOperation,
    PreprocessingError,
};

/// Spatial radius of the bilateral window (5x5)
const BILATERAL_RADIUS: i64 = 2;
/// Spatial sigma of the bilateral window
const BILATERAL_SPATIAL_SIGMA: f32 = 1.5;

pub const DEFAULT_CLAHE_CLIP_LIMIT: f32 = 2.0;
pub const DEFAULT_CLAHE_GRID: (u32, u32) = (8, 8);

/// Reduces noise with a bilateral filter while keeping stroke edges sharp.
///
/// Each output pixel is a weighted mean of its 5x5 neighbourhood; weights fall
/// off with both spatial distance and intensity difference, so pixels across
/// a glyph edge contribute almost nothing.
///
/// # Arguments
///
/// * `image` - Grayscale input
/// * `range_sigma` - Intensity difference at which neighbours lose influence
///   (larger smooths more; 20-50 is conservative for text)
///
/// # Returns
///
/// Returns a `Result` containing the denoised image and metadata, or a `PreprocessingError`
///
/// # Examples
///
/// ```no_run
/// use doc_quality::preprocessing::reduce_noise;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let page = image::open("grainy_scan.png")?.to_luma8();
/// let denoised = reduce_noise(&page, 30.0)?;
/// // denoised.image keeps glyph edges while flattening background grain
/// # Ok(())
/// # }
/// ```
pub fn reduce_noise(
    image: &GrayImage,
    range_sigma: f32,
) -> Result<DenoisedImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    if !(range_sigma > 0.0 && range_sigma.is_finite()) {
        return Err(PreprocessingError::InvalidParameter {
            name: "range_sigma",
            message: format!("{} must be greater than 0", range_sigma),
        });
    }

    let (width, height) = image.dimensions();

    // Weights only depend on |difference| and offset, so both are tabulated
    let range_weights: Vec<f32> = (0..256)
        .map(|d| (-((d * d) as f32) / (2.0 * range_sigma * range_sigma)).exp())
        .collect();
    let spatial_weights: Vec<(i64, i64, f32)> = (-BILATERAL_RADIUS..=BILATERAL_RADIUS)
        .flat_map(|dy| (-BILATERAL_RADIUS..=BILATERAL_RADIUS).map(move |dx| (dx, dy)))
        .map(|(dx, dy)| {
            let d2 = (dx * dx + dy * dy) as f32;
            let w = (-d2 / (2.0 * BILATERAL_SPATIAL_SIGMA * BILATERAL_SPATIAL_SIGMA)).exp();
            (dx, dy, w)
        })
        .collect();

    let output = GrayImage::from_fn(width, height, |x, y| {
        let center = image.get_pixel(x, y)[0];
        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;

        for &(dx, dy, spatial) in &spatial_weights {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let neighbor = image.get_pixel(nx as u32, ny as u32)[0];
            let weight = spatial * range_weights[center.abs_diff(neighbor) as usize];
            sum += weight * neighbor as f32;
            weight_sum += weight;
        }

        if weight_sum > 0.0 {
            Luma([(sum / weight_sum).round().clamp(0.0, 255.0) as u8])
        } else {
            Luma([center])
        }
    });

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "docqa_preprocessing",
        "Noise reduction completed in {}ms: range_sigma={:.1}, dimensions={}x{}",
        processing_time.as_millis(),
        range_sigma,
        width,
        height
    );

    Ok(DenoisedImageResult {
        image: output,
        range_sigma,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Applies Contrast Limited Adaptive Histogram Equalization (CLAHE).
///
/// The image is divided into a `tile_grid` of tiles. Each tile gets its own
/// clipped equalization mapping, and every pixel is mapped by bilinear
/// interpolation between the four nearest tile mappings so tile seams do
/// not show.
///
/// # Arguments
///
/// * `image` - Grayscale input
/// * `clip_limit` - Histogram clip as a multiple of the mean bin height (recommended: 2.0)
/// * `tile_grid` - Number of tiles along x and y (recommended: (8, 8))
///
/// # Returns
///
/// Returns a `Result` containing the contrast-enhanced image and metadata, or a `PreprocessingError`
pub fn apply_clahe(
    image: &GrayImage,
    clip_limit: f32,
    tile_grid: (u32, u32),
) -> Result<ClaheImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    // Validate parameters
    if clip_limit <= 0.0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "clip_limit",
            message: format!("{} must be > 0.0", clip_limit),
        });
    }
    if tile_grid.0 == 0 || tile_grid.1 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "tile_grid",
            message: "dimensions must be > 0".to_string(),
        });
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(ClaheImageResult {
            image: image.clone(),
            clip_limit,
            tile_grid,
            processing_time_ms: 0,
        });
    }

    let tile_width = width.div_ceil(tile_grid.0.min(width));
    let tile_height = height.div_ceil(tile_grid.1.min(height));
    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);

    let mut mappings = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for tile_y in 0..tiles_y {
        for tile_x in 0..tiles_x {
            let x0 = tile_x * tile_width;
            let y0 = tile_y * tile_height;
            let x1 = (x0 + tile_width).min(width);
            let y1 = (y0 + tile_height).min(height);
            mappings.push(tile_mapping(image, (x0, y0, x1, y1), clip_limit));
        }
    }

    // Tile centres sit at (i + 0.5) * tile size
    let locate = |pos: u32, size: u32, count: u32| -> (usize, usize, f32) {
        let g = (pos as f32 + 0.5) / size as f32 - 0.5;
        let lower = g.floor().clamp(0.0, (count - 1) as f32) as usize;
        let upper = (lower + 1).min(count as usize - 1);
        let frac = (g - lower as f32).clamp(0.0, 1.0);
        (lower, upper, frac)
    };

    let output = GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, fx) = locate(x, tile_width, tiles_x);
        let (ty0, ty1, fy) = locate(y, tile_height, tiles_y);
        let at = |tx: usize, ty: usize| mappings[ty * tiles_x as usize + tx][value] as f32;

        let top = at(tx0, ty0) * (1.0 - fx) + at(tx1, ty0) * fx;
        let bottom = at(tx0, ty1) * (1.0 - fx) + at(tx1, ty1) * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    });

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "docqa_preprocessing",
        "CLAHE applied in {}ms: clip_limit={}, tile_grid={:?}",
        processing_time.as_millis(),
        clip_limit,
        (tiles_x, tiles_y)
    );

    Ok(ClaheImageResult {
        image: output,
        clip_limit,
        tile_grid: (tiles_x, tiles_y),
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Clipped equalization lookup table of one tile.
fn tile_mapping(image: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32), clip_limit: f32) -> [u8; 256] {
    let total_pixels = ((x1 - x0) * (y1 - y0)) as f32;

    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    // Apply clip limit
    let clip_limit_pixels = ((clip_limit * (total_pixels / 256.0)).round() as u32).max(1);
    let mut excess_pixels = 0u32;
    for count in &mut histogram {
        if *count > clip_limit_pixels {
            excess_pixels += *count - clip_limit_pixels;
            *count = clip_limit_pixels;
        }
    }

    // Redistribute excess pixels uniformly
    let uniform_increment = excess_pixels / 256;
    let mut remainder = excess_pixels % 256;
    for count in &mut histogram {
        *count += uniform_increment;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    let mut mapping = [0u8; 256];
    let mut cumulative = 0u32;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += count;
        mapping[value] = (cumulative as f32 / total_pixels * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    mapping
}

/// Applies a 3x3 morphological operation to a binarized page.
///
/// Ink is assumed dark on a light background, so "opening" removes dark
/// specks and "closing" fills light gaps inside dark strokes.
///
/// # Arguments
///
/// * `image` - Binary (or grayscale) page
/// * `operation` - The morphological operation to apply
///
/// # Examples
///
/// ```no_run
/// use doc_quality::preprocessing::{apply_morphological_operation, MorphologicalOperation};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let binary = image::open("binary_page.png")?.to_luma8();
/// let cleaned = apply_morphological_operation(&binary, MorphologicalOperation::Cleanup);
/// # Ok(())
/// # }
/// ```
pub fn apply_morphological_operation(
    image: &GrayImage,
    operation: MorphologicalOperation,
) -> MorphologicalImageResult {
    let start_time = std::time::Instant::now();

    // Ink is dark: a max filter erodes it and a min filter dilates it
    let processed = match operation {
        MorphologicalOperation::Erosion => max_filter_3x3(image),
        MorphologicalOperation::Dilation => min_filter_3x3(image),
        MorphologicalOperation::Opening => min_filter_3x3(&max_filter_3x3(image)),
        MorphologicalOperation::Closing => max_filter_3x3(&min_filter_3x3(image)),
        MorphologicalOperation::Cleanup => {
            let opened = min_filter_3x3(&max_filter_3x3(image));
            max_filter_3x3(&min_filter_3x3(&opened))
        }
    };

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "docqa_preprocessing",
        "Morphological operation completed in {}ms: operation={:?}, dimensions={}x{}",
        processing_time.as_millis(),
        operation,
        processed.width(),
        processed.height()
    );

    MorphologicalImageResult {
        image: processed,
        operation,
        kernel_size: 3,
        processing_time_ms: processing_time.as_millis() as u32,
    }
}

fn min_filter_3x3(image: &GrayImage) -> GrayImage {
    neighborhood_filter(image, u8::min, 255)
}

fn max_filter_3x3(image: &GrayImage) -> GrayImage {
    neighborhood_filter(image, u8::max, 0)
}

/// Folds the 3x3 neighbourhood of every pixel; out-of-bounds taps are skipped.
fn neighborhood_filter(image: &GrayImage, fold: fn(u8, u8) -> u8, init: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = init;
        for ny in y.saturating_sub(1)..(y + 2).min(height) {
            for nx in x.saturating_sub(1)..(x + 2).min(width) {
                acc = fold(acc, image.get_pixel(nx, ny)[0]);
            }
        }
        Luma([acc])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_with_black_center(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if x == size / 2 && y == size / 2 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_reduce_noise_invalid_sigma() {
        let img = GrayImage::new(10, 10);
        assert!(reduce_noise(&img, 0.0).is_err());
        assert!(reduce_noise(&img, f32::NAN).is_err());
    }

    #[test]
    fn test_reduce_noise_keeps_uniform_image() {
        let img = GrayImage::from_pixel(20, 20, Luma([180]));
        let result = reduce_noise(&img, 30.0).unwrap();
        assert_eq!(result.image, img);
    }

    #[test]
    fn test_reduce_noise_preserves_hard_edges() {
        let img = GrayImage::from_fn(20, 20, |x, _| if x < 10 { Luma([20]) } else { Luma([235]) });
        let result = reduce_noise(&img, 20.0).unwrap();
        assert_eq!(result.image.get_pixel(9, 10)[0], 20);
        assert_eq!(result.image.get_pixel(10, 10)[0], 235);
    }

    #[test]
    fn test_reduce_noise_smooths_small_variations() {
        let img = GrayImage::from_fn(20, 20, |x, y| Luma([if (x + y) % 2 == 0 { 120 } else { 130 }]));
        let result = reduce_noise(&img, 50.0).unwrap();
        let center = result.image.get_pixel(10, 10)[0];
        assert!((122..=128).contains(&center), "center was {}", center);
    }

    #[test]
    fn test_clahe_invalid_parameters() {
        let img = GrayImage::new(16, 16);
        assert!(apply_clahe(&img, 0.0, (8, 8)).is_err());
        assert!(apply_clahe(&img, 2.0, (0, 8)).is_err());
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let img = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 16) as u8]));
        let result = apply_clahe(&img, DEFAULT_CLAHE_CLIP_LIMIT, DEFAULT_CLAHE_GRID).unwrap();

        let spread = |im: &GrayImage| {
            let min = im.pixels().map(|p| p[0]).min().unwrap();
            let max = im.pixels().map(|p| p[0]).max().unwrap();
            max - min
        };
        assert!(spread(&result.image) > spread(&img));
        assert_eq!(result.tile_grid, (8, 8));
    }

    #[test]
    fn test_clahe_grid_clamped_to_small_images() {
        let img = GrayImage::from_pixel(3, 2, Luma([50]));
        let result = apply_clahe(&img, 2.0, (8, 8)).unwrap();
        assert_eq!(result.image.dimensions(), (3, 2));
        assert!(result.tile_grid.0 <= 3 && result.tile_grid.1 <= 2);
    }

    #[test]
    fn test_opening_removes_isolated_speck() {
        let img = white_with_black_center(7);
        let result = apply_morphological_operation(&img, MorphologicalOperation::Opening);
        assert!(result.image.pixels().all(|p| p[0] == 255));
        assert_eq!(result.kernel_size, 3);
    }

    #[test]
    fn test_closing_fills_gap_in_stroke() {
        // Horizontal 3px stroke with a one-pixel gap
        let img = GrayImage::from_fn(15, 9, |x, y| {
            if (3..6).contains(&y) && x != 7 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let result = apply_morphological_operation(&img, MorphologicalOperation::Closing);
        assert_eq!(result.image.get_pixel(7, 4)[0], 0);
    }

    #[test]
    fn test_grayscale_input_keeps_levels() {
        let img = GrayImage::from_pixel(5, 5, Luma([140]));
        let result = apply_morphological_operation(&img, MorphologicalOperation::Cleanup);
        assert_eq!(result.image, img);
    }

    #[test]
    fn test_erosion_shrinks_and_dilation_grows_ink() {
        let img = white_with_black_center(7);
        let eroded = apply_morphological_operation(&img, MorphologicalOperation::Erosion);
        assert!(eroded.image.pixels().all(|p| p[0] == 255));

        let dilated = apply_morphological_operation(&img, MorphologicalOperation::Dilation);
        let ink = dilated.image.pixels().filter(|p| p[0] == 0).count();
        assert_eq!(ink, 9);
    }
}
