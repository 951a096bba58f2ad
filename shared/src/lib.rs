//! Shared imaging types and image processing for the DMD calibration system.
//!
//! This crate holds the data types exchanged between the calibration engine
//! and the hardware collaborators (camera frames, projector patterns, image
//! dimensions), plus the pure image-processing building blocks the engine is
//! built from: Gaussian blur, stack statistics, and connected-region
//! extraction.

pub mod frame;
pub mod image_proc;
pub mod image_size;
pub mod pattern;

pub use frame::CameraFrame;
pub use image_size::ImageSize;
pub use pattern::{DmdPattern, PatternError};
