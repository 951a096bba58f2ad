//! Marker blob detection in captured camera frames.
//!
//! Segments a frame into candidate bright regions given the radiometric
//! dark/bright reference levels, filters out non-circular and degenerate
//! regions, and flags detections whose bounding box touches the frame edge
//! (their centroid would be biased by truncation). Zero or multiple surviving
//! detections are normal outcomes for the caller to interpret, not errors.

use ndarray::Array2;
use shared::image_proc::{blur::gaussian_blur, regions::find_regions};
use shared::CameraFrame;

/// One detected bright region.
#[derive(Debug, Clone)]
pub struct Blob {
    /// Intensity-weighted centroid (x, y) in camera pixels.
    pub centroid: (f64, f64),
    /// Region pixel count.
    pub area: f64,
    /// Chain-code boundary length.
    pub perimeter: f64,
    /// Isoperimetric ratio, 1.0 for a perfect disk.
    pub circularity: f64,
    /// Bounding box within `edge_margin_px` of a frame boundary.
    pub touches_edge: bool,
}

/// Detect candidate marker blobs in `frame`.
///
/// The frame is blurred before thresholding at the dark/bright midpoint;
/// blurring after binarization would corrupt the region boundaries, so the
/// order is load-bearing. Returns an empty vector when nothing passes the
/// filters.
pub fn find_blobs(
    frame: &CameraFrame,
    dark_level: f64,
    bright_level: f64,
    blur_sigma: f64,
    min_circularity: f64,
    edge_margin_px: u32,
) -> Vec<Blob> {
    let threshold = (dark_level + bright_level) / 2.0;
    let blurred = gaussian_blur(frame.to_f64().view(), blur_sigma);
    let mask: Array2<bool> = blurred.mapv(|v| v > threshold);

    let (rows, cols) = mask.dim();
    let margin = edge_margin_px as usize;

    let mut blobs = Vec::new();
    for region in find_regions(mask.view()) {
        if region.area == 0 || region.perimeter <= 0.0 {
            continue;
        }
        let area = region.area as f64;
        let circularity = 2.0 * (std::f64::consts::PI * area).sqrt() / region.perimeter;
        if circularity < min_circularity {
            continue;
        }

        let (min_x, min_y, max_x, max_y) = region.bbox;
        let touches_edge = min_x <= margin
            || min_y <= margin
            || max_x + margin >= cols.saturating_sub(1)
            || max_y + margin >= rows.saturating_sub(1);

        // First moments weighted by blurred intensity over the region pixels;
        // bounding-box centers would be biased by asymmetric tails.
        let mut weight_sum = 0.0;
        let mut moment_x = 0.0;
        let mut moment_y = 0.0;
        for &(x, y) in &region.pixels {
            let w = blurred[[y, x]];
            weight_sum += w;
            moment_x += w * x as f64;
            moment_y += w * y as f64;
        }
        if weight_sum <= 0.0 {
            continue;
        }

        blobs.push(Blob {
            centroid: (moment_x / weight_sum, moment_y / weight_sum),
            area,
            perimeter: region.perimeter,
            circularity,
            touches_edge,
        });
    }
    blobs
}
