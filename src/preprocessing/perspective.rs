//! # Perspective Correction Module
//!
//! Finds the outline of a photographed page and warps it onto an upright
//! rectangle. Correction is best-effort: when no four-cornered outline is
//! found the input is returned unchanged.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area};
use imageproc::morphology::dilate;
use imageproc::point::Point;
use tracing;

use super::types::PerspectiveResult;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Polygon approximation tolerance as a fraction of the contour perimeter
const APPROX_EPSILON_FRACTION: f64 = 0.02;
/// Quads smaller than this share of the image are treated as noise
const MIN_QUAD_AREA_FRACTION: f64 = 0.2;

type Pt = (f64, f64);

/// Rectifies the page outline found in `image`.
///
/// The largest outer contour of the edge map is approximated to a polygon
/// with a tolerance of 2% of its perimeter. When that polygon has exactly four
/// vertices they are ordered top-left, top-right, bottom-right, bottom-left and
/// mapped onto a rectangle whose sides are the longer of each pair of opposing
/// edges.
///
/// # Arguments
///
/// * `image` - Grayscale page raster
///
/// # Returns
///
/// A [`PerspectiveResult`]; `corrected` is false when the input was returned as is.
///
/// # Examples
///
/// ```no_run
/// use doc_quality::preprocessing::correct_perspective;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let page = image::open("photo_of_invoice.jpg")?.to_luma8();
/// let result = correct_perspective(&page);
/// if result.corrected {
///     println!("Rectified to {}x{}", result.image.width(), result.image.height());
/// }
/// # Ok(())
/// # }
/// ```
pub fn correct_perspective(image: &GrayImage) -> PerspectiveResult {
    let start_time = std::time::Instant::now();

    let Some(corners) = find_page_quad(image) else {
        tracing::debug!(
            target: "docqa_preprocessing",
            "No four-cornered page outline found, skipping perspective correction"
        );
        return PerspectiveResult {
            image: image.clone(),
            corners: None,
            corrected: false,
            processing_time_ms: start_time.elapsed().as_millis() as u32,
        };
    };

    let Some(warped) = warp_to_rectangle(image, &corners) else {
        tracing::debug!(
            target: "docqa_preprocessing",
            corners = ?corners,
            "Degenerate page outline, skipping perspective correction"
        );
        return PerspectiveResult {
            image: image.clone(),
            corners: Some(corners),
            corrected: false,
            processing_time_ms: start_time.elapsed().as_millis() as u32,
        };
    };

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "docqa_preprocessing",
        "Perspective corrected in {}ms: {}x{} -> {}x{}",
        processing_time.as_millis(),
        image.width(),
        image.height(),
        warped.width(),
        warped.height()
    );

    PerspectiveResult {
        image: warped,
        corners: Some(corners),
        corrected: true,
        processing_time_ms: processing_time.as_millis() as u32,
    }
}

/// Locates the ordered corners of the page outline, if there is one.
pub fn find_page_quad(image: &GrayImage) -> Option<[(f32, f32); 4]> {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return None;
    }

    // Dilation closes the small gaps canny leaves at corners.
    let edges = dilate(&canny(image, CANNY_LOW, CANNY_HIGH), Norm::LInf, 1);

    let largest = find_contours::<i32>(&edges)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.points.len() >= 4)
        .map(|c| c.points)
        .max_by(|a, b| contour_area(a).total_cmp(&contour_area(b)))?;

    let perimeter = arc_length(&largest, true);
    if perimeter <= 0.0 {
        return None;
    }
    let approx = approximate_closed_polygon(&largest, APPROX_EPSILON_FRACTION * perimeter);
    if approx.len() != 4 {
        tracing::debug!(
            target: "docqa_preprocessing",
            vertices = approx.len(),
            "Largest contour does not reduce to a quadrilateral"
        );
        return None;
    }

    let area = contour_area(&approx);
    let min_area = MIN_QUAD_AREA_FRACTION * width as f64 * height as f64;
    if area < min_area {
        tracing::debug!(
            target: "docqa_preprocessing",
            area,
            min_area,
            "Quadrilateral too small to be the page outline"
        );
        return None;
    }

    let vertices: Vec<Pt> = approx.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    order_corners(&vertices)
}

/// Orders four points as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest coordinate sum and bottom-right the largest; of
/// the remaining two, the one with the smallest `y - x` is top-right.
pub fn order_corners(points: &[Pt]) -> Option<[(f32, f32); 4]> {
    if points.len() != 4 {
        return None;
    }

    let sum = |p: &Pt| p.0 + p.1;
    let (tl, _) = points
        .iter()
        .enumerate()
        .min_by(|a, b| sum(a.1).total_cmp(&sum(b.1)))?;
    let (br, _) = points
        .iter()
        .enumerate()
        .max_by(|a, b| sum(a.1).total_cmp(&sum(b.1)))?;
    if tl == br {
        return None;
    }

    let rest: Vec<Pt> = (0..4).filter(|&i| i != tl && i != br).map(|i| points[i]).collect();
    let diff = |p: &Pt| p.1 - p.0;
    let (tr, bl) = if diff(&rest[0]) <= diff(&rest[1]) {
        (rest[0], rest[1])
    } else {
        (rest[1], rest[0])
    };

    let to_f32 = |p: Pt| (p.0 as f32, p.1 as f32);
    Some([to_f32(points[tl]), to_f32(tr), to_f32(points[br]), to_f32(bl)])
}

fn warp_to_rectangle(image: &GrayImage, corners: &[(f32, f32); 4]) -> Option<GrayImage> {
    let [tl, tr, br, bl] = *corners;
    let dist = |a: (f32, f32), b: (f32, f32)| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();

    let out_width = dist(br, bl).max(dist(tr, tl)).round() as u32;
    let out_height = dist(tr, br).max(dist(tl, bl)).round() as u32;
    if out_width < 2 || out_height < 2 {
        return None;
    }

    let (right, bottom) = ((out_width - 1) as f32, (out_height - 1) as f32);
    let destination = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];
    let projection = Projection::from_control_points(*corners, destination)?;

    let mut output = GrayImage::new(out_width, out_height);
    warp_into(
        image,
        &projection,
        Interpolation::Bicubic,
        Luma([255u8]),
        &mut output,
    );
    Some(output)
}

fn farthest_from(points: &[Point<i32>], origin: Point<i32>) -> usize {
    let squared_distance = |p: &Point<i32>| {
        let (dx, dy) = ((p.x - origin.x) as i64, (p.y - origin.y) as i64);
        dx * dx + dy * dy
    };
    points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| squared_distance(p))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Douglas-Peucker simplification of a closed contour.
///
/// The contour is split at two mutually distant points and each half is
/// simplified as an open chain, so the result does not depend on where the
/// contour tracing started.
fn approximate_closed_polygon(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.len() < 3 || epsilon <= 0.0 {
        return points.to_vec();
    }

    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    let (i, j) = (a.min(b), a.max(b));
    if i == j {
        return vec![points[i]];
    }

    let second: Vec<Point<i32>> = points[j..].iter().chain(points[..=i].iter()).copied().collect();

    let mut polygon = approximate_polygon_dp(&points[i..=j], epsilon, false);
    polygon.pop();
    let mut tail = approximate_polygon_dp(&second, epsilon, false);
    tail.pop();
    polygon.extend(tail);
    polygon
}
