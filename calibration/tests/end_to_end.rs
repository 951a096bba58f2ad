//! Full calibration runs against the simulated bench.

use approx::assert_relative_eq;
use calibration::{CalibrationConfig, CalibrationError, CalibrationSession, SessionState};
use hardware::sim::{GroundTruthAffine, SimBenchParams, SimulatedBench};
use shared::ImageSize;

fn sim_config() -> CalibrationConfig {
    CalibrationConfig {
        dmd_size: ImageSize::from_width_height(200, 200),
        samples_per_field: 4,
        blur_sigma_field: 5,
        blur_sigma_blob: 1,
        min_circularity: 0.6,
        min_resolved_points: 9,
        ..Default::default()
    }
}

fn sim_params(noise_sigma: f64) -> SimBenchParams {
    SimBenchParams {
        dmd_size: ImageSize::from_width_height(200, 200),
        camera_size: ImageSize::from_width_height(256, 256),
        truth: GroundTruthAffine::from_scale_rotation_translation(0.5, 5.0, 60.0, 45.0),
        noise_sigma,
        seed: 99,
        ..Default::default()
    }
}

fn sim_session(
    config: CalibrationConfig,
    bench: &SimulatedBench,
) -> CalibrationSession<
    hardware::sim::SimProjector,
    hardware::sim::SimCamera,
    hardware::sim::SimIllumination,
> {
    CalibrationSession::new(
        config,
        bench.projector(),
        bench.camera(),
        bench.illumination(),
    )
    .unwrap()
}

#[test]
fn noisy_bench_run_recovers_ground_truth() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bench = SimulatedBench::new(sim_params(4.0));
    let truth = bench.truth();
    let mut session = sim_session(sim_config(), &bench);

    let result = session.run().unwrap();

    assert_eq!(session.state(), SessionState::GeometryDone);
    assert_relative_eq!(result.levels.dark_level, 100.0, epsilon = 2.0);
    assert_relative_eq!(result.levels.bright_level, 2000.0, epsilon = 4.0);

    let t = &result.transform;
    assert_eq!(t.num_points, 9);
    assert!(t.max_error < 1.0, "max residual {} px", t.max_error);
    let (ex, ey) = truth.apply(100.0, 100.0);
    let (fx, fy) = t.dmd_to_camera(100.0, 100.0);
    assert_relative_eq!(fx, ex, epsilon = 0.5);
    assert_relative_eq!(fy, ey, epsilon = 0.5);

    assert!(!bench.is_light_on());
    assert!(bench.stop_count() >= 2);
}

#[test]
fn display_failure_mid_geometry_tears_down() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bench = SimulatedBench::new(sim_params(0.0));
    let mut session = sim_session(sim_config(), &bench);

    session.run_brightness_phase().unwrap();
    assert!(!bench.is_light_on());

    bench.fail_next_display();
    let result = session.run_geometry_phase(None);
    assert!(matches!(result, Err(CalibrationError::Transport(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!bench.is_light_on());
    assert!(bench.stop_count() >= 2);
}

#[test]
fn completed_session_cannot_rerun() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bench = SimulatedBench::new(sim_params(0.0));
    let mut session = sim_session(sim_config(), &bench);

    session.run().unwrap();
    assert!(matches!(
        session.run_brightness_phase(),
        Err(CalibrationError::PhaseOrder {
            expected: SessionState::Idle,
            actual: SessionState::GeometryDone,
        })
    ));
}
