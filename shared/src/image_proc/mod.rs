//! Pure image-processing building blocks.
//!
//! Everything here operates on plain ndarray views with no hardware or
//! configuration dependencies, so the calibration engine's heuristics stay
//! testable in isolation.

pub mod blur;
pub mod regions;
pub mod stats;

pub use blur::gaussian_blur;
pub use regions::{find_regions, Region};
