//! Radiometric field-level calibration.
//!
//! Establishes what "fully dark" and "fully lit" mean in camera counts, and
//! which subregion of the frame the projector actually illuminates (the DMD's
//! active area may not fill the whole sensor). Works from repeated dark-field
//! and bright-field exposure sets, with statistical validity checks that
//! catch a dead light source, a non-overlapping projection, or an exposure
//! too short to separate the fields from sensor noise.

use log::{info, warn};
use ndarray::Array2;
use shared::image_proc::blur::gaussian_blur;
use shared::image_proc::stats::{
    frame_mean, frame_variance, masked_mean, mean_pairwise_variance, mean_stack_variance,
    stack_mean,
};
use shared::CameraFrame;

use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

/// Counts within this margin of the u16 ceiling are treated as saturated.
const SATURATION_GUARD: f64 = 64.0;

/// Radiometric reference levels and illuminated region for one session.
#[derive(Debug, Clone)]
pub struct RadiometricLevels {
    /// Mean camera counts of the averaged dark field over the whole frame.
    pub dark_level: f64,
    /// Mean camera counts of the averaged bright field over the illuminated
    /// region.
    pub bright_level: f64,
    /// Camera pixels judged to receive projector light.
    pub illuminated_mask: Array2<bool>,
}

impl RadiometricLevels {
    /// Fraction of the frame classified as illuminated.
    pub fn illuminated_fraction(&self) -> f64 {
        let total = self.illuminated_mask.len();
        if total == 0 {
            return 0.0;
        }
        self.illuminated_mask.iter().filter(|&&m| m).count() as f64 / total as f64
    }
}

/// Derives [`RadiometricLevels`] from dark and bright exposure sets.
pub struct FieldLevelCalibrator<'a> {
    config: &'a CalibrationConfig,
}

impl<'a> FieldLevelCalibrator<'a> {
    pub fn new(config: &'a CalibrationConfig) -> Self {
        Self { config }
    }

    /// Compute levels and the illuminated mask from the two exposure sets.
    pub fn calibrate(
        &self,
        dark_frames: &[CameraFrame],
        bright_frames: &[CameraFrame],
    ) -> Result<RadiometricLevels, CalibrationError> {
        let expected = self.config.samples_per_field;
        if dark_frames.len() != expected || bright_frames.len() != expected {
            return Err(CalibrationError::ExposureCountMismatch {
                expected,
                dark: dark_frames.len(),
                bright: bright_frames.len(),
            });
        }

        let dark_stack: Vec<Array2<f64>> = dark_frames.iter().map(CameraFrame::to_f64).collect();
        let bright_stack: Vec<Array2<f64>> =
            bright_frames.iter().map(CameraFrame::to_f64).collect();

        let avg_dark = stack_mean(&dark_stack);
        let avg_bright = stack_mean(&bright_stack);

        // Intra-set variance measures sensor and temporal noise; the variance
        // between the averaged fields measures actual signal separation.
        let var_within_dark = mean_stack_variance(&dark_stack);
        let var_within_bright = mean_stack_variance(&bright_stack);
        let var_between = mean_pairwise_variance(avg_dark.view(), avg_bright.view());

        info!(
            "field variances: within dark {var_within_dark:.3}, within bright \
             {var_within_bright:.3}, between fields {var_between:.3}"
        );

        let threshold = self.config.variance_ratio_threshold;
        if var_between <= f64::EPSILON
            || var_within_dark > threshold * var_between
            || var_within_bright > threshold * var_between
        {
            return Err(CalibrationError::InsufficientSignalSeparation {
                var_within_dark,
                var_within_bright,
                var_between,
            });
        }

        // The dark field should be spatially flat; structure there means
        // stray light leaking past the DMD off state.
        let var_dark_field = frame_variance(avg_dark.view());
        if var_dark_field > self.config.dark_unevenness_threshold * var_between {
            return Err(CalibrationError::UnevenDarkField {
                var_dark_field,
                var_between,
            });
        }

        if bright_frames
            .iter()
            .any(|f| f64::from(f.max_sample()) >= f64::from(u16::MAX) - SATURATION_GUARD)
        {
            warn!("bright-field exposures contain samples near the sensor ceiling; bright level may be clipped");
        }

        let mean_dark = frame_mean(avg_dark.view());
        let mean_bright = frame_mean(avg_bright.view());

        // The wide blur recovers the coarse illuminated boundary without
        // speckle; the bias fraction pushes ambiguous transition pixels into
        // the dark class so they cannot dilute the bright-level estimate.
        let sigma = f64::from(self.config.blur_sigma_field);
        let blurred_bright = gaussian_blur(avg_bright.view(), sigma);
        let cut = mean_dark + self.config.mask_bias_fraction * (mean_bright - mean_dark);
        let illuminated_mask = blurred_bright.mapv(|v| v > cut);

        // Dark is frame-uniform by the check above; bright is restricted to
        // the illuminated region to handle partial-frame projection.
        let dark_level = mean_dark;
        let bright_level = masked_mean(avg_bright.view(), illuminated_mask.view())
            .ok_or(CalibrationError::EmptyIlluminatedMask)?;

        let levels = RadiometricLevels {
            dark_level,
            bright_level,
            illuminated_mask,
        };
        info!(
            "field levels: dark {dark_level:.1}, bright {bright_level:.1}, illuminated fraction {:.3}",
            levels.illuminated_fraction()
        );
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};
    use shared::ImageSize;

    const SIZE: usize = 64;

    fn test_config() -> CalibrationConfig {
        CalibrationConfig {
            dmd_size: ImageSize::from_width_height(256, 256),
            samples_per_field: 4,
            blur_sigma_field: 5,
            ..Default::default()
        }
    }

    fn uniform_frames(count: usize, level: u16) -> Vec<CameraFrame> {
        (0..count)
            .map(|_| CameraFrame::new(Array2::from_elem((SIZE, SIZE), level)))
            .collect()
    }

    fn noisy_frames(count: usize, level: f64, sigma: f64, seed: u64) -> Vec<CameraFrame> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let normal = Normal::new(level, sigma).unwrap();
        (0..count)
            .map(|_| {
                let data = Array2::from_shape_fn((SIZE, SIZE), |_| {
                    normal.sample(&mut rng).round().max(0.0) as u16
                });
                CameraFrame::new(data)
            })
            .collect()
    }

    #[test]
    fn test_identical_fields_fail_signal_separation() {
        let config = test_config();
        let calibrator = FieldLevelCalibrator::new(&config);
        let frames = uniform_frames(4, 100);
        let result = calibrator.calibrate(&frames, &frames);
        assert!(matches!(
            result,
            Err(CalibrationError::InsufficientSignalSeparation { .. })
        ));
    }

    #[test]
    fn test_clean_fields_recover_levels() {
        let config = test_config();
        let calibrator = FieldLevelCalibrator::new(&config);
        let levels = calibrator
            .calibrate(&uniform_frames(4, 100), &uniform_frames(4, 2000))
            .unwrap();

        assert_relative_eq!(levels.dark_level, 100.0, epsilon = 1e-9);
        assert_relative_eq!(levels.bright_level, 2000.0, epsilon = 1e-9);
        // Uniform illumination covers the whole frame.
        assert_relative_eq!(levels.illuminated_fraction(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_noisy_fields_within_tolerance_pass() {
        let config = test_config();
        let calibrator = FieldLevelCalibrator::new(&config);
        let dark = noisy_frames(4, 100.0, 3.0, 11);
        let bright = noisy_frames(4, 2000.0, 8.0, 12);
        let levels = calibrator.calibrate(&dark, &bright).unwrap();
        assert_relative_eq!(levels.dark_level, 100.0, epsilon = 1.0);
        assert_relative_eq!(levels.bright_level, 2000.0, epsilon = 2.0);
    }

    #[test]
    fn test_excessive_exposure_noise_fails() {
        let mut config = test_config();
        // Small separation with loud noise.
        config.variance_ratio_threshold = 0.001;
        let calibrator = FieldLevelCalibrator::new(&config);
        let dark = noisy_frames(4, 100.0, 20.0, 21);
        let bright = noisy_frames(4, 160.0, 20.0, 22);
        assert!(matches!(
            calibrator.calibrate(&dark, &bright),
            Err(CalibrationError::InsufficientSignalSeparation { .. })
        ));
    }

    #[test]
    fn test_partial_illumination_masks_bright_region() {
        let config = test_config();
        let calibrator = FieldLevelCalibrator::new(&config);
        let dark = uniform_frames(4, 100);
        // Left half lit at 2000, right half dark.
        let bright: Vec<CameraFrame> = (0..4)
            .map(|_| {
                let data = Array2::from_shape_fn((SIZE, SIZE), |(_, col)| {
                    if col < SIZE / 2 {
                        2000u16
                    } else {
                        100u16
                    }
                });
                CameraFrame::new(data)
            })
            .collect();

        let levels = calibrator.calibrate(&dark, &bright).unwrap();
        assert_relative_eq!(levels.dark_level, 100.0, epsilon = 1e-9);
        // Restricting to the mask keeps the bright level near 2000 instead of
        // the frame mean of ~1050. The blur lets a few transition columns in,
        // so allow some dilution.
        assert!(
            levels.bright_level > 1600.0,
            "bright level {} diluted by unlit half",
            levels.bright_level
        );
        let fraction = levels.illuminated_fraction();
        assert!(
            (0.35..=0.65).contains(&fraction),
            "illuminated fraction {fraction} should be about half"
        );
    }

    #[test]
    fn test_wrong_exposure_count_fails() {
        let config = test_config();
        let calibrator = FieldLevelCalibrator::new(&config);
        let result = calibrator.calibrate(&uniform_frames(3, 100), &uniform_frames(4, 2000));
        assert!(matches!(
            result,
            Err(CalibrationError::ExposureCountMismatch {
                expected: 4,
                dark: 3,
                bright: 4
            })
        ));
    }

    #[test]
    fn test_uneven_dark_field_fails() {
        let config = test_config();
        let calibrator = FieldLevelCalibrator::new(&config);
        // Strong gradient across the dark frame: stray light.
        let dark: Vec<CameraFrame> = (0..4)
            .map(|_| {
                let data =
                    Array2::from_shape_fn((SIZE, SIZE), |(_, col)| 100 + (col as u16) * 30);
                CameraFrame::new(data)
            })
            .collect();
        let bright = uniform_frames(4, 2000);
        assert!(matches!(
            calibrator.calibrate(&dark, &bright),
            Err(CalibrationError::UnevenDarkField { .. })
        ));
    }
}
