//! Camera interface trait for calibration workflows.

use crate::TransportError;
use serde::{Deserialize, Serialize};
use shared::CameraFrame;

/// Settings for one exposure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureSettings {
    /// Exposure time in milliseconds.
    pub exposure_ms: f64,
}

impl Default for ExposureSettings {
    fn default() -> Self {
        Self { exposure_ms: 100.0 }
    }
}

/// Interface to the microscope camera.
///
/// One blocking exposure per call; the sensor dimensions are fixed for the
/// life of the device, so every returned frame has the same size.
pub trait Camera {
    /// Expose and return one frame.
    fn capture(&mut self, settings: &ExposureSettings) -> Result<CameraFrame, TransportError>;
}
