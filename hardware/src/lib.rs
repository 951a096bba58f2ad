//! Hardware collaborator interfaces for the DMD calibration bench.
//!
//! The calibration engine drives three exclusive physical resources through
//! the traits in this crate: the DMD projector, the microscope camera, and
//! the illumination source. Real deployments implement these traits over
//! their transport of choice (remote shell to the projector host, microscope
//! control software for the camera); [`sim`] provides an in-process bench
//! with a known ground-truth geometry for tests and dry runs.

pub mod camera;
pub mod illumination;
pub mod projector;
pub mod sim;

pub use camera::{Camera, ExposureSettings};
pub use illumination::IlluminationSource;
pub use projector::Projector;

use thiserror::Error;

/// Communication or device failure in a hardware collaborator.
///
/// Transport failures are distinct from calibration validity failures: the
/// engine propagates them unchanged so the operator can tell a broken link
/// from a bad optical setup.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("projector transport failure: {0}")]
    Projector(String),
    #[error("camera transport failure: {0}")]
    Camera(String),
    #[error("illumination control failure: {0}")]
    Illumination(String),
}
