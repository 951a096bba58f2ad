//! Illumination source interface trait.

use crate::TransportError;

/// Interface to the excitation light source (laser or lamp).
///
/// The calibration session enables the source for the duration of a phase and
/// guarantees `disable` runs on every exit path, so implementations must
/// tolerate `disable` when already off.
pub trait IlluminationSource {
    /// Turn the light source on.
    fn enable(&mut self) -> Result<(), TransportError>;

    /// Turn the light source off.
    fn disable(&mut self) -> Result<(), TransportError>;

    /// Whether the source is currently on.
    fn is_enabled(&self) -> bool;
}
