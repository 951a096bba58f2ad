//! DMD pattern type.
//!
//! A [`DmdPattern`] is an image destined for the projector: a 2D grid of float
//! intensities at the DMD's fixed canvas dimensions. Every element stays in
//! [0, 1]; the constructors enforce it and the mutators clamp, so a pattern
//! handed to the projector collaborator is always displayable.

use crate::image_size::ImageSize;
use ndarray::{Array2, ArrayView2};
use thiserror::Error;

/// Errors constructing a pattern from raw data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatternError {
    #[error("pattern value {value} at ({x}, {y}) is outside [0, 1]")]
    ValueOutOfRange { x: usize, y: usize, value: f64 },
    #[error("pattern level {0} is outside [0, 1]")]
    LevelOutOfRange(f64),
}

/// An image for the DMD canvas, intensities in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct DmdPattern {
    data: Array2<f64>,
}

impl DmdPattern {
    /// Uniform field at `level` (0.0 for a dark field, 1.0 for a bright field).
    pub fn solid(size: ImageSize, level: f64) -> Result<Self, PatternError> {
        if !(0.0..=1.0).contains(&level) {
            return Err(PatternError::LevelOutOfRange(level));
        }
        Ok(Self {
            data: Array2::from_elem((size.height, size.width), level),
        })
    }

    /// Wrap an existing array, validating the [0, 1] invariant.
    pub fn from_array(data: Array2<f64>) -> Result<Self, PatternError> {
        for ((row, col), &value) in data.indexed_iter() {
            if !(0.0..=1.0).contains(&value) {
                return Err(PatternError::ValueOutOfRange {
                    x: col,
                    y: row,
                    value,
                });
            }
        }
        Ok(Self { data })
    }

    /// Canvas dimensions.
    pub fn size(&self) -> ImageSize {
        let (height, width) = self.data.dim();
        ImageSize { width, height }
    }

    /// Read-only view of the intensities, shape (height, width).
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Intensity at pixel (x, y).
    pub fn value_at(&self, x: usize, y: usize) -> f64 {
        self.data[[y, x]]
    }

    /// Add `delta` to the pixel at (x, y), clamping the result into [0, 1].
    ///
    /// Compositing overlapping shapes never pushes a value outside range.
    pub fn add_clamped(&mut self, x: usize, y: usize, delta: f64) {
        let cell = &mut self.data[[y, x]];
        *cell = (*cell + delta).clamp(0.0, 1.0);
    }

    /// Quantize to the full 16-bit range for transports that upload the
    /// pattern as an integer image.
    pub fn to_u16(&self) -> Array2<u16> {
        self.data.mapv(|v| (v * f64::from(u16::MAX)).round() as u16)
    }

    /// Count of pixels with intensity strictly above `level`.
    pub fn count_above(&self, level: f64) -> usize {
        self.data.iter().filter(|&&v| v > level).count()
    }
}
