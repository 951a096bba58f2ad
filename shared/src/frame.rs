//! Camera frame type.
//!
//! A [`CameraFrame`] is one exposure from the microscope camera: a 2D grid of
//! unsigned 16-bit intensity samples at the sensor's fixed dimensions. Frames
//! are produced by the camera collaborator and consumed read-only by the
//! calibration engine.

use crate::image_size::ImageSize;
use ndarray::{Array2, ArrayView2};

/// One captured camera exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFrame {
    data: Array2<u16>,
}

impl CameraFrame {
    /// Wrap raw sensor data. Shape is (height, width).
    pub fn new(data: Array2<u16>) -> Self {
        Self { data }
    }

    /// Sensor dimensions of this frame.
    pub fn size(&self) -> ImageSize {
        let (height, width) = self.data.dim();
        ImageSize { width, height }
    }

    /// Read-only view of the raw samples.
    pub fn view(&self) -> ArrayView2<'_, u16> {
        self.data.view()
    }

    /// Convert to a float array for statistics and filtering.
    pub fn to_f64(&self) -> Array2<f64> {
        self.data.mapv(f64::from)
    }

    /// Largest sample value in the frame.
    pub fn max_sample(&self) -> u16 {
        self.data.iter().copied().max().unwrap_or(0)
    }
}

impl From<Array2<u16>> for CameraFrame {
    fn from(data: Array2<u16>) -> Self {
        Self::new(data)
    }
}
