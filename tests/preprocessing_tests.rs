//! Integration tests for the enhancement pipeline and image quality scoring

mod common;

use common::{text_page, with_gaussian_noise};
use doc_quality::ocr_config::{BorderMode, EnhancementConfig};
use doc_quality::preprocessing::{
    assess_image_quality, deskew_image, detect_skew_angle, reduce_noise, rotate_image,
    EnhancementPipeline, HoughOptions, StageKind,
};
use doc_quality::raster::Raster;
use image::{DynamicImage, GrayImage, Luma};

fn lines_page(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if x >= 20 && x < width - 20 && y >= 20 && y < height - 20 && (y - 20) % 30 < 3 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(p, q)| p[0].abs_diff(q[0]) as u64)
        .sum();
    total as f64 / (a.width() as f64 * a.height() as f64)
}

#[test]
fn test_passthrough_is_bit_identical() {
    let pipeline = EnhancementPipeline::new(EnhancementConfig::passthrough());

    let gray = Raster::Gray(with_gaussian_noise(&text_page(90, 70), 20.0, 1));
    assert_eq!(pipeline.run(&gray).raster, gray);

    let rgb = Raster::Rgb(DynamicImage::ImageLuma8(text_page(90, 70)).to_rgb8());
    let page = pipeline.run(&rgb);
    assert_eq!(page.raster, rgb);
    assert_eq!(page.raster.channels(), 3);
    assert!(page.skew_angle_degrees.is_none());
}

#[test]
fn test_deskew_corrects_tilted_page() {
    let tilted = rotate_image(&lines_page(400, 300), 4.0, BorderMode::Constant(255));
    let result = deskew_image(&tilted, BorderMode::Replicate);

    assert!(result.rotated);
    let detected = result.skew_angle_degrees.unwrap();
    assert!((detected - 4.0).abs() < 0.5, "detected {}", detected);

    // The corrected page is straight: detection finds less than half a degree
    // and a second deskew leaves it alone
    let residual = detect_skew_angle(&result.image, &HoughOptions::default());
    assert!(residual.map_or(true, |angle| angle.abs() < 0.5), "residual {:?}", residual);
    assert!(!deskew_image(&result.image, BorderMode::Replicate).rotated);
}

#[test]
fn test_deskew_is_idempotent_across_angles() {
    for angle in [-5.0f32, -3.0, 2.0, 6.0] {
        let tilted = rotate_image(&lines_page(400, 300), angle, BorderMode::Constant(255));
        let once = deskew_image(&tilted, BorderMode::Replicate);
        assert!(once.rotated, "{} degree tilt not corrected", angle);

        let residual = detect_skew_angle(&once.image, &HoughOptions::default());
        assert!(
            residual.map_or(true, |r| r.abs() < 0.5),
            "residual {:?} after correcting {}",
            residual,
            angle
        );
        let twice = deskew_image(&once.image, BorderMode::Replicate);
        assert!(!twice.rotated, "second pass rotated a {} degree page again", angle);
    }
}

#[test]
fn test_deskew_leaves_straight_page_alone() {
    let page = lines_page(300, 200);
    let result = deskew_image(&page, BorderMode::Replicate);
    assert!(!result.rotated);
    assert_eq!(result.image, page);
}

#[test]
fn test_gaussian_noise_raises_noise_score() {
    let clean = text_page(120, 90);
    let noisy = with_gaussian_noise(&clean, 25.0, 42);

    let clean_metrics = assess_image_quality(&Raster::Gray(clean));
    let noisy_metrics = assess_image_quality(&Raster::Gray(noisy));
    assert!(noisy_metrics.noise > clean_metrics.noise);
    // Noise must not masquerade as a change in focus or contrast
    assert!(
        (noisy_metrics.sharpness - clean_metrics.sharpness).abs() <= 0.15,
        "sharpness {} -> {}",
        clean_metrics.sharpness,
        noisy_metrics.sharpness
    );
    assert!(
        (noisy_metrics.contrast - clean_metrics.contrast).abs() <= 0.15,
        "contrast {} -> {}",
        clean_metrics.contrast,
        noisy_metrics.contrast
    );
    for metrics in [clean_metrics, noisy_metrics] {
        assert!((0.0..=1.0).contains(&metrics.composite));
    }
}

#[test]
fn test_denoise_moves_back_towards_clean_page() {
    let clean = text_page(120, 90);
    let noisy = with_gaussian_noise(&clean, 15.0, 7);
    let denoised = reduce_noise(&noisy, 30.0).unwrap().image;

    assert!(mean_abs_diff(&denoised, &clean) < mean_abs_diff(&noisy, &clean));
}

#[test]
fn test_full_pipeline_on_noisy_color_scan() {
    let noisy = with_gaussian_noise(&text_page(160, 120), 18.0, 3);
    let rgb = Raster::Rgb(DynamicImage::ImageLuma8(noisy).to_rgb8());

    let page = EnhancementPipeline::new(EnhancementConfig::default()).run(&rgb);

    assert_eq!(page.raster.channels(), 1);
    assert_eq!(page.applied.first(), Some(&StageKind::Grayscale));
    assert!(page.applied.contains(&StageKind::Binarize));
    let Raster::Gray(out) = &page.raster else {
        panic!("expected grayscale output");
    };
    assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
}
