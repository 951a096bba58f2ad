//! Projector interface trait for calibration workflows.

use crate::TransportError;
use shared::DmdPattern;

/// Interface to the DMD projector.
///
/// Abstracts the pattern upload/display transport for testability in
/// calibration workflows. The device shows one pattern at a time; `display`
/// replaces whatever is currently shown and blocks until the pattern is live.
pub trait Projector {
    /// Upload `pattern` and display it on the DMD.
    fn display(&mut self, pattern: &DmdPattern) -> Result<(), TransportError>;

    /// Stop displaying and blank the DMD.
    ///
    /// Must be safe to call when nothing is displayed; the session calls it
    /// unconditionally during teardown.
    fn stop(&mut self) -> Result<(), TransportError>;
}
