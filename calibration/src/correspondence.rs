//! Grid sweep matching DMD marker positions to camera centroids.
//!
//! Steps a single circular marker through the calibration grid, captures one
//! frame per position, and accepts a correspondence only when detection is
//! unambiguous: exactly one blob that does not touch the frame edge. The
//! resolver never guesses among multiple candidates; an injectable
//! [`BlobArbiter`] may override an ambiguous position (manual review), and
//! everything else stays unresolved and is simply excluded from the fit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hardware::{Camera, Projector};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::blob::{find_blobs, Blob};
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;
use crate::field_level::RadiometricLevels;
use crate::pattern::{circle_pattern, grid_positions, GridPosition};

/// One matched (DMD position, camera centroid) sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrespondencePair {
    /// Marker center on the DMD canvas.
    pub dmd: GridPosition,
    /// Detected blob centroid (x, y) in camera pixels.
    pub camera: (f64, f64),
}

/// What happened at one grid position.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionOutcome {
    /// Exactly one clean detection.
    Resolved,
    /// Nothing passed the blob filters.
    NoBlobs,
    /// Detections existed but all touched the frame edge.
    OnlyEdgeBlobs { edge_count: usize },
    /// Multiple clean candidates and no arbiter decision.
    Ambiguous { candidate_count: usize },
    /// Multiple clean candidates, one picked by the arbiter.
    Overridden { candidate_count: usize },
}

/// Full record of a grid sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Accepted correspondences, in grid order.
    pub pairs: Vec<CorrespondencePair>,
    /// Per-position outcome for every position that was attempted.
    pub outcomes: Vec<(GridPosition, PositionOutcome)>,
    /// Sweep was cancelled; `pairs` holds the already-resolved prefix.
    pub cancelled: bool,
}

impl SweepOutcome {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }
}

/// Cooperative cancellation flag, checked between grid positions.
///
/// Clones share the flag, so a UI thread can hold one end while the sweep
/// polls the other.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// External reviewer for positions with multiple clean candidates.
///
/// Returns the index of the chosen candidate, or `None` to leave the
/// position unresolved.
pub trait BlobArbiter {
    fn arbitrate(&mut self, position: GridPosition, candidates: &[Blob]) -> Option<usize>;
}

/// Drives the projector and camera through the calibration grid.
pub struct CorrespondenceResolver<'a> {
    config: &'a CalibrationConfig,
    levels: &'a RadiometricLevels,
    cancel: CancelToken,
}

impl<'a> CorrespondenceResolver<'a> {
    pub fn new(config: &'a CalibrationConfig, levels: &'a RadiometricLevels) -> Self {
        Self {
            config,
            levels,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sweep the full grid, one marker per position.
    ///
    /// Cancellation between positions is not an error: the outcome carries
    /// the resolved prefix with `cancelled` set. Transport failures abort
    /// the sweep immediately.
    pub fn sweep<P: Projector, C: Camera>(
        &self,
        projector: &mut P,
        camera: &mut C,
        mut arbiter: Option<&mut dyn BlobArbiter>,
    ) -> Result<SweepOutcome, CalibrationError> {
        let positions = grid_positions(
            self.config.dmd_size,
            self.config.circle_diameter,
            self.config.circle_spacing,
        )?;
        info!(
            "sweeping {} grid positions ({} px marker, {} px spacing)",
            positions.len(),
            self.config.circle_diameter,
            self.config.circle_spacing
        );

        let total = positions.len();
        let mut pairs = Vec::new();
        let mut outcomes = Vec::new();
        for position in positions {
            if self.cancel.is_cancelled() {
                warn!(
                    "sweep cancelled after {} of {total} positions",
                    outcomes.len()
                );
                return Ok(SweepOutcome {
                    pairs,
                    outcomes,
                    cancelled: true,
                });
            }

            let pattern = circle_pattern(
                self.config.dmd_size,
                self.config.circle_diameter,
                position.x,
                position.y,
            )?;
            projector.display(&pattern)?;
            let frame = camera.capture(&self.config.exposure)?;

            let blobs = find_blobs(
                &frame,
                self.levels.dark_level,
                self.levels.bright_level,
                f64::from(self.config.blur_sigma_blob),
                self.config.min_circularity,
                self.config.edge_margin_px,
            );
            let reborrowed: Option<&mut dyn BlobArbiter> = match arbiter {
                Some(ref mut a) => Some(&mut **a),
                None => None,
            };
            let (pair, outcome) = resolve_position(position, &blobs, reborrowed);
            debug!(
                "grid ({}, {}): {} blob(s), {:?}",
                position.x,
                position.y,
                blobs.len(),
                outcome
            );
            if let Some(pair) = pair {
                pairs.push(pair);
            }
            outcomes.push((position, outcome));
        }

        info!(
            "resolved {} of {} grid positions",
            pairs.len(),
            outcomes.len()
        );
        Ok(SweepOutcome {
            pairs,
            outcomes,
            cancelled: false,
        })
    }
}

/// Apply the unambiguous-match policy to one position's detections.
fn resolve_position(
    position: GridPosition,
    blobs: &[Blob],
    arbiter: Option<&mut dyn BlobArbiter>,
) -> (Option<CorrespondencePair>, PositionOutcome) {
    let clean: Vec<&Blob> = blobs.iter().filter(|b| !b.touches_edge).collect();
    match clean.len() {
        0 if blobs.is_empty() => (None, PositionOutcome::NoBlobs),
        0 => (
            None,
            PositionOutcome::OnlyEdgeBlobs {
                edge_count: blobs.len(),
            },
        ),
        1 => (
            Some(CorrespondencePair {
                dmd: position,
                camera: clean[0].centroid,
            }),
            PositionOutcome::Resolved,
        ),
        n => {
            if let Some(arbiter) = arbiter {
                let owned: Vec<Blob> = clean.iter().map(|&b| b.clone()).collect();
                if let Some(index) = arbiter.arbitrate(position, &owned) {
                    if let Some(chosen) = owned.get(index) {
                        return (
                            Some(CorrespondencePair {
                                dmd: position,
                                camera: chosen.centroid,
                            }),
                            PositionOutcome::Overridden { candidate_count: n },
                        );
                    }
                    warn!(
                        "arbiter chose out-of-range candidate {index} of {n} at ({}, {})",
                        position.x, position.y
                    );
                }
            }
            (None, PositionOutcome::Ambiguous { candidate_count: n })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use hardware::sim::{SimBenchParams, SimulatedBench};
    use hardware::{ExposureSettings, IlluminationSource, TransportError};
    use shared::{CameraFrame, ImageSize};

    fn bench_config() -> CalibrationConfig {
        CalibrationConfig {
            dmd_size: ImageSize::from_width_height(200, 200),
            blur_sigma_field: 5,
            blur_sigma_blob: 1,
            // Markers land at ~4.5 px radius on the camera; small digitized
            // disks sit below the production circularity cutoff.
            min_circularity: 0.6,
            ..Default::default()
        }
    }

    fn bench_params() -> SimBenchParams {
        SimBenchParams {
            dmd_size: ImageSize::from_width_height(200, 200),
            camera_size: ImageSize::from_width_height(256, 256),
            ..Default::default()
        }
    }

    fn bench_levels(bench: &SimulatedBench) -> RadiometricLevels {
        let camera = bench.params().camera_size;
        RadiometricLevels {
            dark_level: bench.params().dark_level,
            bright_level: bench.params().bright_level,
            illuminated_mask: ndarray::Array2::from_elem(
                (camera.height, camera.width),
                true,
            ),
        }
    }

    fn test_blob(cx: f64, cy: f64, touches_edge: bool) -> Blob {
        Blob {
            centroid: (cx, cy),
            area: 64.0,
            perimeter: 28.0,
            circularity: 1.0,
            touches_edge,
        }
    }

    #[test]
    fn test_sweep_resolves_full_grid() {
        let config = bench_config();
        let bench = SimulatedBench::new(bench_params());
        let levels = bench_levels(&bench);
        let truth = bench.truth();
        let mut projector = bench.projector();
        let mut camera = bench.camera();
        bench.illumination().enable().unwrap();

        let resolver = CorrespondenceResolver::new(&config, &levels);
        let outcome = resolver.sweep(&mut projector, &mut camera, None).unwrap();

        assert!(!outcome.cancelled);
        // 200 px canvas, 19 px marker, 70 px spacing: 3 positions per axis.
        assert_eq!(outcome.attempted(), 9);
        assert_eq!(outcome.pairs.len(), 9);
        for pair in &outcome.pairs {
            let (ex, ey) = truth.apply(f64::from(pair.dmd.x), f64::from(pair.dmd.y));
            assert_relative_eq!(pair.camera.0, ex, epsilon = 1.0);
            assert_relative_eq!(pair.camera.1, ey, epsilon = 1.0);
        }
    }

    #[test]
    fn test_dark_projector_yields_no_blobs() {
        let config = bench_config();
        let bench = SimulatedBench::new(bench_params());
        let levels = bench_levels(&bench);
        let mut projector = bench.projector();
        let mut camera = bench.camera();
        // Light source left off so every capture is a dark frame.

        let resolver = CorrespondenceResolver::new(&config, &levels);
        let outcome = resolver.sweep(&mut projector, &mut camera, None).unwrap();

        assert!(outcome.pairs.is_empty());
        assert!(outcome
            .outcomes
            .iter()
            .all(|(_, o)| *o == PositionOutcome::NoBlobs));
    }

    #[test]
    fn test_pre_cancelled_token_truncates_immediately() {
        let config = bench_config();
        let bench = SimulatedBench::new(bench_params());
        let levels = bench_levels(&bench);
        let mut projector = bench.projector();
        let mut camera = bench.camera();
        bench.illumination().enable().unwrap();

        let token = CancelToken::new();
        token.cancel();
        let resolver =
            CorrespondenceResolver::new(&config, &levels).with_cancel_token(token);
        let outcome = resolver.sweep(&mut projector, &mut camera, None).unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.attempted(), 0);
    }

    /// Camera wrapper that trips a cancel token after a fixed number of
    /// captures.
    struct CancellingCamera<C> {
        inner: C,
        token: CancelToken,
        remaining: usize,
    }

    impl<C: Camera> Camera for CancellingCamera<C> {
        fn capture(
            &mut self,
            settings: &ExposureSettings,
        ) -> Result<CameraFrame, TransportError> {
            let frame = self.inner.capture(settings)?;
            if self.remaining > 0 {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.token.cancel();
                }
            }
            Ok(frame)
        }
    }

    #[test]
    fn test_mid_sweep_cancel_keeps_resolved_prefix() {
        let config = bench_config();
        let bench = SimulatedBench::new(bench_params());
        let levels = bench_levels(&bench);
        let truth = bench.truth();
        let mut projector = bench.projector();
        bench.illumination().enable().unwrap();

        let token = CancelToken::new();
        let mut camera = CancellingCamera {
            inner: bench.camera(),
            token: token.clone(),
            remaining: 4,
        };
        let resolver =
            CorrespondenceResolver::new(&config, &levels).with_cancel_token(token);
        let outcome = resolver.sweep(&mut projector, &mut camera, None).unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.attempted(), 4);
        assert_eq!(outcome.pairs.len(), 4);
        // The resolved prefix stays intact and correct.
        for pair in &outcome.pairs {
            let (ex, ey) = truth.apply(f64::from(pair.dmd.x), f64::from(pair.dmd.y));
            assert_relative_eq!(pair.camera.0, ex, epsilon = 1.0);
            assert_relative_eq!(pair.camera.1, ey, epsilon = 1.0);
        }
    }

    #[test]
    fn test_capture_failure_aborts_sweep() {
        let config = bench_config();
        let bench = SimulatedBench::new(bench_params());
        let levels = bench_levels(&bench);
        let mut projector = bench.projector();
        let mut camera = bench.camera();
        bench.illumination().enable().unwrap();
        bench.fail_next_capture();

        let resolver = CorrespondenceResolver::new(&config, &levels);
        let result = resolver.sweep(&mut projector, &mut camera, None);
        assert!(matches!(
            result,
            Err(CalibrationError::Transport(TransportError::Camera(_)))
        ));
    }

    #[test]
    fn test_resolve_single_clean_blob() {
        let position = GridPosition { x: 10, y: 20 };
        let blobs = vec![test_blob(42.0, 24.0, false)];
        let (pair, outcome) = resolve_position(position, &blobs, None);
        assert_eq!(outcome, PositionOutcome::Resolved);
        assert_eq!(pair.unwrap().camera, (42.0, 24.0));
    }

    #[test]
    fn test_resolve_edge_blob_unresolved() {
        let position = GridPosition { x: 10, y: 20 };
        let blobs = vec![test_blob(2.0, 24.0, true)];
        let (pair, outcome) = resolve_position(position, &blobs, None);
        assert!(pair.is_none());
        assert_eq!(outcome, PositionOutcome::OnlyEdgeBlobs { edge_count: 1 });
    }

    #[test]
    fn test_resolve_ambiguous_without_arbiter() {
        let position = GridPosition { x: 10, y: 20 };
        let blobs = vec![test_blob(42.0, 24.0, false), test_blob(90.0, 80.0, false)];
        let (pair, outcome) = resolve_position(position, &blobs, None);
        assert!(pair.is_none());
        assert_eq!(outcome, PositionOutcome::Ambiguous { candidate_count: 2 });
    }

    struct PickSecond;

    impl BlobArbiter for PickSecond {
        fn arbitrate(&mut self, _position: GridPosition, candidates: &[Blob]) -> Option<usize> {
            (candidates.len() > 1).then_some(1)
        }
    }

    #[test]
    fn test_arbiter_overrides_ambiguity() {
        let position = GridPosition { x: 10, y: 20 };
        let blobs = vec![
            test_blob(42.0, 24.0, false),
            test_blob(90.0, 80.0, false),
            // Edge blob is never offered to the arbiter.
            test_blob(2.0, 2.0, true),
        ];
        let mut arbiter = PickSecond;
        let (pair, outcome) =
            resolve_position(position, &blobs, Some(&mut arbiter));
        assert_eq!(outcome, PositionOutcome::Overridden { candidate_count: 2 });
        assert_eq!(pair.unwrap().camera, (90.0, 80.0));
    }

    #[test]
    fn test_arbiter_declining_leaves_ambiguous() {
        struct Decline;
        impl BlobArbiter for Decline {
            fn arbitrate(&mut self, _p: GridPosition, _c: &[Blob]) -> Option<usize> {
                None
            }
        }
        let position = GridPosition { x: 10, y: 20 };
        let blobs = vec![test_blob(42.0, 24.0, false), test_blob(90.0, 80.0, false)];
        let mut arbiter = Decline;
        let (pair, outcome) = resolve_position(position, &blobs, Some(&mut arbiter));
        assert!(pair.is_none());
        assert_eq!(outcome, PositionOutcome::Ambiguous { candidate_count: 2 });
    }
}
