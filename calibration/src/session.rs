//! Two-phase calibration orchestration with hardware-safe teardown.
//!
//! A session owns its projector, camera, and illumination collaborators for
//! the whole run; phases execute strictly sequentially. Every phase exit,
//! success or failure, goes through the same shutdown path that disables the
//! illumination source and stops the projector, so no error can leave the
//! light powered or a pattern displayed.

use log::{error, info, warn};

use hardware::{Camera, IlluminationSource, Projector, TransportError};
use shared::CameraFrame;

use crate::affine::{fit_affine_transform, AffineTransform};
use crate::config::CalibrationConfig;
use crate::correspondence::{BlobArbiter, CancelToken, CorrespondenceResolver, SweepOutcome};
use crate::error::{CalibrationError, ConfigError};
use crate::field_level::{FieldLevelCalibrator, RadiometricLevels};
use crate::pattern::solid_field;

/// Session lifecycle; `Failed` is reachable from any active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    BrightnessCalibrating,
    BrightnessDone,
    GeometryCalibrating,
    GeometryDone,
    Failed,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub levels: RadiometricLevels,
    pub transform: AffineTransform,
    /// Per-position record of the geometry sweep.
    pub sweep: SweepOutcome,
}

/// Orchestrates field-level then geometric calibration over owned hardware
/// collaborators.
pub struct CalibrationSession<P, C, L> {
    config: CalibrationConfig,
    projector: P,
    camera: C,
    illumination: L,
    state: SessionState,
    cancel: CancelToken,
    levels: Option<RadiometricLevels>,
    transform: Option<AffineTransform>,
    last_sweep: Option<SweepOutcome>,
}

impl<P, C, L> CalibrationSession<P, C, L>
where
    P: Projector,
    C: Camera,
    L: IlluminationSource,
{
    /// Validate the configuration and take ownership of the hardware.
    pub fn new(
        config: CalibrationConfig,
        projector: P,
        camera: C,
        illumination: L,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            projector,
            camera,
            illumination,
            state: SessionState::Idle,
            cancel: CancelToken::new(),
            levels: None,
            transform: None,
            last_sweep: None,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn levels(&self) -> Option<&RadiometricLevels> {
        self.levels.as_ref()
    }

    pub fn transform(&self) -> Option<&AffineTransform> {
        self.transform.as_ref()
    }

    pub fn last_sweep(&self) -> Option<&SweepOutcome> {
        self.last_sweep.as_ref()
    }

    /// Phase one: establish dark/bright reference levels.
    ///
    /// The illumination source is disabled on every exit path; an error
    /// mid-capture never leaves the light powered.
    pub fn run_brightness_phase(&mut self) -> Result<&RadiometricLevels, CalibrationError> {
        self.require_state(SessionState::Idle)?;
        self.state = SessionState::BrightnessCalibrating;
        info!("brightness phase: {} exposures per field", self.config.samples_per_field);

        let result = self.brightness_inner();
        let levels = self.finish_phase(result, SessionState::BrightnessDone)?;
        self.levels = Some(levels);
        Ok(self.levels.as_ref().unwrap_or_else(|| unreachable!()))
    }

    fn brightness_inner(&mut self) -> Result<RadiometricLevels, CalibrationError> {
        self.illumination.enable()?;

        let dark = solid_field(self.config.dmd_size, 0.0);
        self.projector.display(&dark)?;
        let dark_frames = self.capture_stack()?;

        let bright = solid_field(self.config.dmd_size, 1.0);
        self.projector.display(&bright)?;
        let bright_frames = self.capture_stack()?;

        FieldLevelCalibrator::new(&self.config).calibrate(&dark_frames, &bright_frames)
    }

    fn capture_stack(&mut self) -> Result<Vec<CameraFrame>, TransportError> {
        (0..self.config.samples_per_field)
            .map(|_| self.camera.capture(&self.config.exposure))
            .collect()
    }

    /// Phase two: sweep the marker grid and fit the affine transform.
    ///
    /// Requires a completed brightness phase. An `arbiter`, when given, is
    /// consulted for positions with multiple clean detections.
    pub fn run_geometry_phase(
        &mut self,
        arbiter: Option<&mut dyn BlobArbiter>,
    ) -> Result<&AffineTransform, CalibrationError> {
        self.require_state(SessionState::BrightnessDone)?;
        self.state = SessionState::GeometryCalibrating;

        let result = self.geometry_inner(arbiter);
        let (transform, sweep) = self.finish_phase(result, SessionState::GeometryDone)?;
        info!(
            "geometry phase complete: {} points, rms {:.3} px, max {:.3} px",
            transform.num_points, transform.rms_error, transform.max_error
        );
        self.last_sweep = Some(sweep);
        self.transform = Some(transform);
        Ok(self.transform.as_ref().unwrap_or_else(|| unreachable!()))
    }

    fn geometry_inner(
        &mut self,
        arbiter: Option<&mut dyn BlobArbiter>,
    ) -> Result<(AffineTransform, SweepOutcome), CalibrationError> {
        let levels = self
            .levels
            .as_ref()
            .unwrap_or_else(|| unreachable!("state gate guarantees levels"));

        self.illumination.enable()?;
        let resolver = CorrespondenceResolver::new(&self.config, levels)
            .with_cancel_token(self.cancel.clone());
        let sweep = resolver.sweep(&mut self.projector, &mut self.camera, arbiter)?;

        if sweep.cancelled {
            return Err(CalibrationError::Cancelled);
        }
        if sweep.pairs.len() < self.config.min_resolved_points {
            return Err(CalibrationError::TooFewCorrespondences {
                needed: self.config.min_resolved_points,
                got: sweep.pairs.len(),
                attempted: sweep.attempted(),
            });
        }

        let transform = fit_affine_transform(&sweep.pairs)?;
        if transform.max_error > self.config.max_fit_error_px {
            return Err(CalibrationError::FitResidualTooLarge {
                max_err: transform.max_error,
                limit: self.config.max_fit_error_px,
            });
        }
        Ok((transform, sweep))
    }

    /// Both phases back to back.
    pub fn run(&mut self) -> Result<CalibrationResult, CalibrationError> {
        self.run_brightness_phase()?;
        self.run_geometry_phase(None)?;
        Ok(CalibrationResult {
            levels: self.levels.clone().unwrap_or_else(|| unreachable!()),
            transform: self.transform.clone().unwrap_or_else(|| unreachable!()),
            sweep: self.last_sweep.clone().unwrap_or_else(|| unreachable!()),
        })
    }

    /// Request cancellation; takes effect between grid positions.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn require_state(&self, expected: SessionState) -> Result<(), CalibrationError> {
        if self.state != expected {
            return Err(CalibrationError::PhaseOrder {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Close out a phase: always run the hardware shutdown, then combine its
    /// result with the phase result. The phase error wins when both fail.
    fn finish_phase<T>(
        &mut self,
        result: Result<T, CalibrationError>,
        success_state: SessionState,
    ) -> Result<T, CalibrationError> {
        let shutdown = self.hardware_safe_shutdown();
        match (result, shutdown) {
            (Ok(value), Ok(())) => {
                self.state = success_state;
                Ok(value)
            }
            (Ok(_), Err(e)) => {
                error!("phase succeeded but hardware shutdown failed: {e}");
                self.state = SessionState::Failed;
                Err(e.into())
            }
            (Err(e), Ok(())) => {
                self.state = SessionState::Failed;
                Err(e)
            }
            (Err(e), Err(shutdown_err)) => {
                warn!("hardware shutdown also failed: {shutdown_err}");
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    /// Illumination off, projection stopped. Attempts both even if the first
    /// fails.
    fn hardware_safe_shutdown(&mut self) -> Result<(), TransportError> {
        let light = self.illumination.disable();
        let projection = self.projector.stop();
        light.and(projection)
    }
}
