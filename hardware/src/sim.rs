//! Simulated calibration bench.
//!
//! An in-process projector/camera/illumination triple backed by one shared
//! optical state. The camera renders whatever pattern the projector is
//! showing through a configurable ground-truth affine transform, on top of
//! configurable dark/bright radiometric levels and optional Gaussian sensor
//! noise. Calibration runs against the simulated bench should recover the
//! ground truth, which is what the integration tests and the dry-run binary
//! check.

use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use shared::{CameraFrame, DmdPattern, ImageSize};

use crate::camera::{Camera, ExposureSettings};
use crate::illumination::IlluminationSource;
use crate::projector::Projector;
use crate::TransportError;

/// Ground-truth DMD-to-camera affine map used by the simulated optics.
#[derive(Debug, Clone, Copy)]
pub struct GroundTruthAffine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl GroundTruthAffine {
    /// Similarity transform: uniform scale, rotation in degrees, translation.
    pub fn from_scale_rotation_translation(
        scale: f64,
        rotation_deg: f64,
        tx: f64,
        ty: f64,
    ) -> Self {
        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        Self {
            a: scale * cos,
            b: -scale * sin,
            c: scale * sin,
            d: scale * cos,
            tx,
            ty,
        }
    }

    /// Map DMD coordinates to camera coordinates.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    /// Map camera coordinates back to DMD coordinates.
    fn apply_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.a * self.d - self.b * self.c;
        let dx = x - self.tx;
        let dy = y - self.ty;
        ((self.d * dx - self.b * dy) / det, (self.a * dy - self.c * dx) / det)
    }
}

/// Construction parameters for [`SimulatedBench`].
#[derive(Debug, Clone)]
pub struct SimBenchParams {
    pub dmd_size: ImageSize,
    pub camera_size: ImageSize,
    pub truth: GroundTruthAffine,
    /// Camera counts for an unlit pixel.
    pub dark_level: f64,
    /// Camera counts for a fully lit pixel.
    pub bright_level: f64,
    /// Standard deviation of additive Gaussian sensor noise; 0 disables it.
    pub noise_sigma: f64,
    /// Seed for the noise generator.
    pub seed: u64,
}

impl Default for SimBenchParams {
    fn default() -> Self {
        Self {
            dmd_size: ImageSize::from_width_height(1280, 800),
            camera_size: ImageSize::from_width_height(512, 512),
            truth: GroundTruthAffine::from_scale_rotation_translation(0.35, 3.0, 40.0, 30.0),
            dark_level: 100.0,
            bright_level: 2000.0,
            noise_sigma: 0.0,
            seed: 7,
        }
    }
}

struct BenchState {
    params: SimBenchParams,
    displayed: Option<DmdPattern>,
    light_on: bool,
    rng: ChaCha8Rng,
    fail_next_display: bool,
    fail_next_capture: bool,
    stop_count: usize,
}

/// Shared simulated optics; hand out collaborator handles with the accessor
/// methods.
#[derive(Clone)]
pub struct SimulatedBench {
    state: Arc<Mutex<BenchState>>,
}

impl SimulatedBench {
    pub fn new(params: SimBenchParams) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        Self {
            state: Arc::new(Mutex::new(BenchState {
                params,
                displayed: None,
                light_on: false,
                rng,
                fail_next_display: false,
                fail_next_capture: false,
                stop_count: 0,
            })),
        }
    }

    pub fn projector(&self) -> SimProjector {
        SimProjector {
            state: self.state.clone(),
        }
    }

    pub fn camera(&self) -> SimCamera {
        SimCamera {
            state: self.state.clone(),
        }
    }

    pub fn illumination(&self) -> SimIllumination {
        SimIllumination {
            state: self.state.clone(),
        }
    }

    pub fn truth(&self) -> GroundTruthAffine {
        self.state.lock().unwrap().params.truth
    }

    pub fn params(&self) -> SimBenchParams {
        self.state.lock().unwrap().params.clone()
    }

    /// Make the next `display` call fail with a transport error.
    pub fn fail_next_display(&self) {
        self.state.lock().unwrap().fail_next_display = true;
    }

    /// Make the next `capture` call fail with a transport error.
    pub fn fail_next_capture(&self) {
        self.state.lock().unwrap().fail_next_capture = true;
    }

    pub fn is_light_on(&self) -> bool {
        self.state.lock().unwrap().light_on
    }

    pub fn is_displaying(&self) -> bool {
        self.state.lock().unwrap().displayed.is_some()
    }

    pub fn stop_count(&self) -> usize {
        self.state.lock().unwrap().stop_count
    }
}

/// Projector handle onto a [`SimulatedBench`].
pub struct SimProjector {
    state: Arc<Mutex<BenchState>>,
}

impl Projector for SimProjector {
    fn display(&mut self, pattern: &DmdPattern) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_display {
            state.fail_next_display = false;
            return Err(TransportError::Projector(
                "simulated display fault".to_string(),
            ));
        }
        if pattern.size() != state.params.dmd_size {
            return Err(TransportError::Projector(format!(
                "pattern size {} does not match DMD canvas {}",
                pattern.size(),
                state.params.dmd_size
            )));
        }
        state.displayed = Some(pattern.clone());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.displayed = None;
        state.stop_count += 1;
        Ok(())
    }
}

/// Camera handle onto a [`SimulatedBench`].
pub struct SimCamera {
    state: Arc<Mutex<BenchState>>,
}

impl Camera for SimCamera {
    fn capture(&mut self, _settings: &ExposureSettings) -> Result<CameraFrame, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next_capture {
            state.fail_next_capture = false;
            return Err(TransportError::Camera("simulated capture fault".to_string()));
        }
        Ok(render_frame(&mut state))
    }
}

fn render_frame(state: &mut BenchState) -> CameraFrame {
    let params = state.params.clone();
    let size = params.camera_size;
    let span = params.bright_level - params.dark_level;
    let noise = (params.noise_sigma > 0.0)
        .then(|| Normal::new(0.0, params.noise_sigma).ok())
        .flatten();

    let mut data = size.empty_array_u16();
    for ((row, col), sample) in data.indexed_iter_mut() {
        let mut lit = 0.0;
        if state.light_on {
            if let Some(pattern) = &state.displayed {
                let (xd, yd) = params.truth.apply_inverse(col as f64, row as f64);
                let xi = xd.round() as i64;
                let yi = yd.round() as i64;
                if params.dmd_size.contains(xi, yi) {
                    lit = pattern.value_at(xi as usize, yi as usize);
                }
            }
        }
        let mut value = params.dark_level + lit * span;
        if let Some(normal) = &noise {
            value += normal.sample(&mut state.rng);
        }
        *sample = value.round().clamp(0.0, f64::from(u16::MAX)) as u16;
    }
    CameraFrame::new(data)
}

/// Illumination handle onto a [`SimulatedBench`].
pub struct SimIllumination {
    state: Arc<Mutex<BenchState>>,
}

impl IlluminationSource for SimIllumination {
    fn enable(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().light_on = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().light_on = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().light_on
    }
}
