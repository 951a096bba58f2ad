//! DMD projector to camera calibration engine.
//!
//! Calibrates the geometric and photometric relationship between a DMD
//! light-pattern projector and the microscope camera observing it. A run has
//! two phases:
//!
//! 1. **Field calibration** — repeated dark-field and bright-field exposures
//!    establish the camera-counts meaning of "fully dark" and "fully lit" and
//!    the subregion of the sensor the projector actually illuminates.
//! 2. **Geometric calibration** — a circular marker is stepped across a grid
//!    of DMD positions; each capture is segmented for candidate blobs, and
//!    unambiguous detections become DMD-to-camera correspondence pairs for a
//!    least-squares affine fit with residual validation.
//!
//! [`session::CalibrationSession`] orchestrates both phases over the
//! `hardware` collaborator traits with hardware-safe teardown on every exit
//! path. The individual stages are usable standalone for diagnostics.

pub mod affine;
pub mod blob;
pub mod config;
pub mod correspondence;
pub mod error;
pub mod field_level;
pub mod pattern;
pub mod session;

pub use affine::{fit_affine_transform, AffineTransform};
pub use blob::{find_blobs, Blob};
pub use config::CalibrationConfig;
pub use correspondence::{
    BlobArbiter, CancelToken, CorrespondencePair, CorrespondenceResolver, PositionOutcome,
    SweepOutcome,
};
pub use error::{CalibrationError, ConfigError, FitError};
pub use pattern::{circle_pattern, grid_positions, GridPosition};
pub use field_level::{FieldLevelCalibrator, RadiometricLevels};
pub use session::{CalibrationResult, CalibrationSession, SessionState};
