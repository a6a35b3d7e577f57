use std::path::PathBuf;

use camera_pipeline_core::{
    FrameOutcome, PipelineConfig, PipelineError, PipelineOrchestrator, RenderSurface,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod demo;

fn main() -> camera_pipeline_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_pipeline(args),
        Commands::InitConfig { output } => write_default_config(&output),
    }
}

fn run_pipeline(args: RunArgs) -> camera_pipeline_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if args.release_on_pause {
        config.release_camera_on_pause = true;
    }
    let surface = RenderSurface::new(
        config.surface.id.clone(),
        args.width.unwrap_or(config.surface.width),
        args.height.unwrap_or(config.surface.height),
    );
    tracing::info!(frames = args.frames, surface = %surface.id, "starting camera pipeline");

    let mut pipeline = PipelineOrchestrator::simulated(config);
    pipeline.add_camera_pipeline_module(Box::new(demo::SceneSeeder::default()))?;
    pipeline.add_camera_pipeline_module(Box::new(demo::FrameLogger::new(args.log_every)))?;
    pipeline.run(surface)?;

    for frame in 0..args.frames {
        if args.pause_at == Some(frame) {
            pipeline.pause();
        }
        if args.resume_at == Some(frame) {
            pipeline.resume()?;
        }
        if args.recenter_at == Some(frame) {
            match pipeline.recenter() {
                Ok(()) => {}
                Err(PipelineError::NotReady(reason)) => tracing::warn!(reason, "recenter skipped"),
                Err(err) => return Err(err),
            }
        }

        match pipeline.tick()? {
            FrameOutcome::Dispatched(report) if !report.update.is_clean() => {
                tracing::warn!(
                    frame = report.frame_index,
                    failures = report.update.failures.len(),
                    "frame had hook failures"
                );
            }
            FrameOutcome::Idle => {
                tracing::info!(frame, "pipeline stopped; leaving frame loop");
                break;
            }
            _ => {}
        }
    }

    tracing::info!(
        dispatched = pipeline.frames_dispatched(),
        failures = pipeline.recent_failures().count(),
        "frame loop finished"
    );
    pipeline.stop();
    Ok(())
}

fn write_default_config(output: &PathBuf) -> camera_pipeline_core::Result<()> {
    tracing::info!(?output, "writing default pipeline configuration");
    let json = PipelineConfig::default().to_json_pretty()?;
    std::fs::write(output, json)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "AR camera pipeline host", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the frame loop against the simulated camera and tracker.
    Run(RunArgs),
    /// Write the default configuration as JSON.
    InitConfig {
        /// Destination path for the configuration file.
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of display refreshes to simulate.
    #[arg(short, long, default_value_t = 120)]
    frames: u64,
    /// Surface width in pixels. Overrides the configuration.
    #[arg(long)]
    width: Option<u32>,
    /// Surface height in pixels. Overrides the configuration.
    #[arg(long)]
    height: Option<u32>,
    /// Pause before this refresh.
    #[arg(long)]
    pause_at: Option<u64>,
    /// Resume before this refresh.
    #[arg(long)]
    resume_at: Option<u64>,
    /// Recenter tracking before this refresh.
    #[arg(long)]
    recenter_at: Option<u64>,
    /// Release the camera while paused.
    #[arg(long)]
    release_on_pause: bool,
    /// Log the camera pose every N frames.
    #[arg(long, default_value_t = 30)]
    log_every: u64,
}
