//! Error taxonomy for the calibration engine.
//!
//! Four failure domains, kept distinct so the operator can tell them apart:
//! static parameter inconsistency ([`ConfigError`]), statistical or physical
//! validation failure ([`CalibrationError`]), a numerically degenerate fit
//! ([`FitError`]), and collaborator transport failure
//! ([`hardware::TransportError`], propagated but never produced here).
//! Validation failures carry the measured values so a failure message is
//! enough to start hardware troubleshooting.

use hardware::TransportError;
use thiserror::Error;

/// Static configuration inconsistency, detectable before touching hardware.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("circle diameter {0} must be a positive odd integer so the marker centers on one pixel")]
    DiameterNotOdd(u32),
    #[error("marker center ({x}, {y}) is closer than radius {radius} to the {canvas} canvas edge")]
    MarkerOutOfBounds {
        x: i64,
        y: i64,
        radius: u32,
        canvas: shared::ImageSize,
    },
    #[error(
        "grid spacing {spacing} exceeds usable {axis} span {span} on the {canvas} canvas; \
         cannot place two grid points"
    )]
    SpacingTooLarge {
        axis: char,
        span: i64,
        spacing: u32,
        canvas: shared::ImageSize,
    },
    #[error("{field} is {value} but must be {requirement}")]
    InvalidParameter {
        field: &'static str,
        value: f64,
        requirement: &'static str,
    },
}

/// Numerically degenerate least-squares system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("cannot fit an affine transform from {got} pairs; need at least {needed}")]
    InsufficientPairs { needed: usize, got: usize },
    #[error(
        "design matrix is rank deficient (rank {rank} of 3): correspondence points are \
         collinear or coincident"
    )]
    Degenerate { rank: usize },
}

/// Statistical or physical validation failure; terminates the current phase.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(
        "expected {expected} dark and bright exposures, got {dark} dark and {bright} bright"
    )]
    ExposureCountMismatch {
        expected: usize,
        dark: usize,
        bright: usize,
    },

    #[error(
        "variance among field calibration exposures is high compared to the dark/bright \
         separation (within dark: {var_within_dark:.3}, within bright: {var_within_bright:.3}, \
         between average dark and bright: {var_between:.3}). Are the light source and DMD on? \
         Does the projected image overlap the camera field? Is the exposure long enough?"
    )]
    InsufficientSignalSeparation {
        var_within_dark: f64,
        var_within_bright: f64,
        var_between: f64,
    },

    #[error(
        "average dark field is too uneven (spatial variance {var_dark_field:.3} vs dark/bright \
         separation {var_between:.3}); check for stray light"
    )]
    UnevenDarkField {
        var_dark_field: f64,
        var_between: f64,
    },

    #[error("no camera pixels classified as illuminated; the projector does not overlap the camera field")]
    EmptyIlluminatedMask,

    #[error("resolved only {got} of {attempted} grid positions; need at least {needed}")]
    TooFewCorrespondences {
        needed: usize,
        got: usize,
        attempted: usize,
    },

    #[error(
        "fitted transform mispredicts camera coordinates by up to {max_err:.2} px, above the \
         acceptable {limit:.2} px"
    )]
    FitResidualTooLarge { max_err: f64, limit: f64 },

    #[error("calibration cancelled between grid positions")]
    Cancelled,

    #[error("phase requires session state {expected:?}, but session is {actual:?}")]
    PhaseOrder {
        expected: crate::session::SessionState,
        actual: crate::session::SessionState,
    },
}
