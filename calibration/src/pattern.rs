//! Calibration pattern generation.
//!
//! Pure functions producing DMD canvas images: solid fields for the
//! radiometric phase and single circular markers for the geometric phase,
//! plus the deterministic grid of marker positions.

use serde::{Deserialize, Serialize};
use shared::{DmdPattern, ImageSize};

use crate::error::ConfigError;

/// Integer marker position on the DMD canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: u32,
    pub y: u32,
}

/// Uniform field at `level`, 0.0 for the dark field and 1.0 for the bright
/// field.
pub fn solid_field(size: ImageSize, level: f64) -> DmdPattern {
    // Levels outside [0, 1] are a programming error, not an operator input.
    DmdPattern::solid(size, level.clamp(0.0, 1.0)).unwrap_or_else(|_| {
        unreachable!("clamped level is always in range");
    })
}

fn circle_radius(diameter: u32) -> Result<u32, ConfigError> {
    if diameter == 0 || diameter % 2 == 0 {
        return Err(ConfigError::DiameterNotOdd(diameter));
    }
    Ok((diameter - 1) / 2)
}

/// Additively draw a filled disk of `diameter` centered at (`center_x`,
/// `center_y`), clamping composited values at 1.0.
///
/// The disk membership test compares squared distance against
/// `(radius + 0.5)^2`; the half-pixel overscan gives symmetric
/// boundary-pixel inclusion so the downstream centroid estimate is unbiased.
pub fn draw_circle(
    pattern: &mut DmdPattern,
    diameter: u32,
    center_x: u32,
    center_y: u32,
) -> Result<(), ConfigError> {
    let radius = circle_radius(diameter)?;
    let canvas = pattern.size();
    let (cx, cy) = (i64::from(center_x), i64::from(center_y));
    let r = i64::from(radius);
    if cx < r
        || cy < r
        || cx + r > canvas.width as i64 - 1
        || cy + r > canvas.height as i64 - 1
    {
        return Err(ConfigError::MarkerOutOfBounds {
            x: cx,
            y: cy,
            radius,
            canvas,
        });
    }

    let limit = (f64::from(radius) + 0.5).powi(2);
    for dy in -r..=r {
        for dx in -r..=r {
            if (dx * dx + dy * dy) as f64 <= limit {
                pattern.add_clamped((cx + dx) as usize, (cy + dy) as usize, 1.0);
            }
        }
    }
    Ok(())
}

/// Dark canvas with a single filled disk marker.
pub fn circle_pattern(
    size: ImageSize,
    diameter: u32,
    center_x: u32,
    center_y: u32,
) -> Result<DmdPattern, ConfigError> {
    let mut pattern = solid_field(size, 0.0);
    draw_circle(&mut pattern, diameter, center_x, center_y)?;
    Ok(pattern)
}

fn axis_positions(
    dim: usize,
    margin: i64,
    spacing: u32,
    axis: char,
    canvas: ImageSize,
) -> Result<Vec<u32>, ConfigError> {
    let span = dim as i64 - 1 - 2 * margin;
    if span < i64::from(spacing) {
        return Err(ConfigError::SpacingTooLarge {
            axis,
            span,
            spacing,
            canvas,
        });
    }
    let intervals = span / i64::from(spacing);
    Ok((0..=intervals)
        .map(|i| (margin as f64 + i as f64 * span as f64 / intervals as f64).round() as u32)
        .collect())
}

/// Deterministic grid of marker positions covering the canvas.
///
/// The margin is the marker radius, so every grid position can legally host a
/// marker. Positions run endpoint-inclusive from `margin` to
/// `dim - 1 - margin` on each axis, evenly spaced with at least `spacing`
/// between neighbors; `floor(span / spacing)` counts the intervals per axis.
/// Ordered row by row.
pub fn grid_positions(
    size: ImageSize,
    diameter: u32,
    spacing: u32,
) -> Result<Vec<GridPosition>, ConfigError> {
    let margin = i64::from(circle_radius(diameter)?);
    let xs = axis_positions(size.width, margin, spacing, 'x', size)?;
    let ys = axis_positions(size.height, margin, spacing, 'y', size)?;

    let mut positions = Vec::with_capacity(xs.len() * ys.len());
    for &y in &ys {
        for &x in &xs {
            positions.push(GridPosition { x, y });
        }
    }
    Ok(positions)
}
