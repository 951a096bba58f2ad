use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use calibration::{CalibrationConfig, CalibrationSession};
use hardware::sim::{GroundTruthAffine, SimBenchParams, SimulatedBench};
use shared::ImageSize;

#[derive(Parser, Debug)]
#[command(author, version, about = "DMD calibration dry run against the simulated bench", long_about = None)]
struct Args {
    #[arg(long, help = "Path to JSON calibration config (defaults used when omitted)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Simulated optical scale (DMD px to camera px)", default_value = "0.7")]
    scale: f64,

    #[arg(long, help = "Simulated optical rotation in degrees", default_value = "3.0")]
    rotation: f64,

    #[arg(long, help = "Simulated camera-x offset in pixels", default_value = "20.0")]
    tx: f64,

    #[arg(long, help = "Simulated camera-y offset in pixels", default_value = "30.0")]
    ty: f64,

    #[arg(long, help = "Simulated sensor noise sigma in camera counts", default_value = "0.0")]
    noise: f64,

    #[arg(long, help = "Noise generator seed", default_value = "7")]
    seed: u64,

    #[arg(long, help = "Simulated camera width in pixels", default_value = "512")]
    camera_width: usize,

    #[arg(long, help = "Simulated camera height in pixels", default_value = "512")]
    camera_height: usize,

    #[arg(short, long, help = "Write the fitted transform as JSON to this path")]
    output: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<CalibrationConfig> {
    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        }
        // The stock DMD canvas does not fit a 512 px simulated camera at a
        // marker-friendly scale, so the dry run defaults to a smaller one.
        None => CalibrationConfig {
            dmd_size: ImageSize::from_width_height(640, 400),
            ..Default::default()
        },
    };
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let params = SimBenchParams {
        dmd_size: config.dmd_size,
        camera_size: ImageSize::from_width_height(args.camera_width, args.camera_height),
        truth: GroundTruthAffine::from_scale_rotation_translation(
            args.scale,
            args.rotation,
            args.tx,
            args.ty,
        ),
        noise_sigma: args.noise,
        seed: args.seed,
        ..Default::default()
    };
    let truth = params.truth;
    let bench = SimulatedBench::new(params);

    println!("Simulated bench:");
    println!("  DMD: {}", config.dmd_size);
    println!("  Camera: {}x{}", args.camera_width, args.camera_height);
    println!(
        "  Ground truth: scale={:.4}, rot={:.2} deg, offset=({:.1}, {:.1})",
        args.scale, args.rotation, truth.tx, truth.ty
    );

    let mut session = CalibrationSession::new(
        config,
        bench.projector(),
        bench.camera(),
        bench.illumination(),
    )
    .context("Invalid calibration configuration")?;

    let result = session.run().context("Calibration run failed")?;

    println!("Field levels:");
    println!("  Dark: {:.1} counts", result.levels.dark_level);
    println!("  Bright: {:.1} counts", result.levels.bright_level);
    println!(
        "  Illuminated fraction: {:.3}",
        result.levels.illuminated_fraction()
    );

    let t = &result.transform;
    let (sx, sy) = t.scale();
    println!("Fitted transform:");
    println!(
        "  Scale=({sx:.4}, {sy:.4}), rot={:.2} deg, offset=({:.1}, {:.1})",
        t.rotation_degrees(),
        t.tx,
        t.ty
    );
    println!(
        "  Points used: {} of {} attempted",
        t.num_points,
        result.sweep.attempted()
    );
    println!("  RMS error: {:.3} pixels", t.rms_error);
    println!("  Max error: {:.3} pixels", t.max_error);

    if let Some(path) = args.output {
        let json = serde_json::to_string_pretty(t)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write transform to {}", path.display()))?;
        println!("Saved to: {}", path.display());
    }

    Ok(())
}
