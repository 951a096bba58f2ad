//! Calibration run configuration.
//!
//! One immutable structure passed into the session at construction; there is
//! no module-level state. Defaults follow the values proven on the bench:
//! 10 exposures per field, a very wide field blur, a 19 px marker on a 70 px
//! grid.

use hardware::ExposureSettings;
use serde::{Deserialize, Serialize};
use shared::ImageSize;

use crate::error::ConfigError;

/// All tunable parameters for one calibration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// DMD canvas dimensions in projector pixels.
    pub dmd_size: ImageSize,
    /// Camera exposure settings used for every capture in the run.
    pub exposure: ExposureSettings,
    /// Number of exposures averaged per solid field (dark and bright alike).
    pub samples_per_field: usize,
    /// Gaussian sigma, in camera px, for the illuminated-boundary blur.
    /// Large on purpose: speckle must not survive it.
    pub blur_sigma_field: u32,
    /// Gaussian sigma, in camera px, applied before binarizing marker images.
    pub blur_sigma_blob: u32,
    /// Maximum allowed intra-set variance as a fraction of the dark/bright
    /// separation variance.
    pub variance_ratio_threshold: f64,
    /// Maximum allowed spatial variance of the averaged dark field as a
    /// fraction of the dark/bright separation variance.
    pub dark_unevenness_threshold: f64,
    /// Fraction of the dark-to-bright span added to the dark mean when
    /// classifying illuminated pixels; biases ambiguous transition pixels
    /// toward the dark class.
    pub mask_bias_fraction: f64,
    /// Marker diameter in DMD px; odd so the disk centers on one pixel.
    pub circle_diameter: u32,
    /// Minimum spacing between grid positions in DMD px.
    pub circle_spacing: u32,
    /// Isoperimetric circularity cutoff for candidate blobs, in (0, 1].
    pub min_circularity: f64,
    /// Blobs whose bounding box comes within this many px of the frame edge
    /// are flagged as possibly truncated.
    pub edge_margin_px: u32,
    /// Maximum acceptable worst-case residual of the fitted transform, in
    /// camera px.
    pub max_fit_error_px: f64,
    /// Minimum number of resolved correspondence pairs; well above the
    /// mathematical minimum of 3 for robustness.
    pub min_resolved_points: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            dmd_size: ImageSize::from_width_height(1280, 800),
            exposure: ExposureSettings::default(),
            samples_per_field: 10,
            blur_sigma_field: 150,
            blur_sigma_blob: 3,
            variance_ratio_threshold: 0.1,
            dark_unevenness_threshold: 0.1,
            mask_bias_fraction: 0.3,
            circle_diameter: 19,
            circle_spacing: 70,
            min_circularity: 0.8,
            edge_margin_px: 3,
            max_fit_error_px: 10.0,
            min_resolved_points: 10,
        }
    }
}

impl CalibrationConfig {
    /// Check parameter-local consistency.
    ///
    /// Grid feasibility against the canvas is checked separately by
    /// [`crate::pattern::grid_positions`], which this calls as well.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circle_diameter == 0 || self.circle_diameter % 2 == 0 {
            return Err(ConfigError::DiameterNotOdd(self.circle_diameter));
        }
        if self.samples_per_field < 2 {
            return Err(ConfigError::InvalidParameter {
                field: "samples_per_field",
                value: self.samples_per_field as f64,
                requirement: "at least 2 to estimate exposure variance",
            });
        }
        if !(self.min_circularity > 0.0 && self.min_circularity <= 1.0) {
            return Err(ConfigError::InvalidParameter {
                field: "min_circularity",
                value: self.min_circularity,
                requirement: "in (0, 1]",
            });
        }
        if self.variance_ratio_threshold <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "variance_ratio_threshold",
                value: self.variance_ratio_threshold,
                requirement: "positive",
            });
        }
        if !(0.0..1.0).contains(&self.mask_bias_fraction) {
            return Err(ConfigError::InvalidParameter {
                field: "mask_bias_fraction",
                value: self.mask_bias_fraction,
                requirement: "in [0, 1)",
            });
        }
        if self.max_fit_error_px <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "max_fit_error_px",
                value: self.max_fit_error_px,
                requirement: "positive",
            });
        }
        if self.min_resolved_points < 3 {
            return Err(ConfigError::InvalidParameter {
                field: "min_resolved_points",
                value: self.min_resolved_points as f64,
                requirement: "at least 3 (affine fit minimum)",
            });
        }
        if self.circle_spacing == 0 {
            return Err(ConfigError::InvalidParameter {
                field: "circle_spacing",
                value: 0.0,
                requirement: "positive",
            });
        }
        // Fails if the canvas cannot hold two grid points per axis.
        crate::pattern::grid_positions(self.dmd_size, self.circle_diameter, self.circle_spacing)?;
        Ok(())
    }
}
