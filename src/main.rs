// src/main.rs

use anyhow::Result;
use clap::Parser;
use lane_tracker::batch;
use lane_tracker::pipeline::{FrameOrchestrator, TracingSink};
use lane_tracker::Config;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Annotate dash-cam images or videos with the tracked lane, its curvature
/// and the vehicle's offset from the lane centre.
#[derive(Debug, Parser)]
#[command(name = "lane-tracker", version)]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Input directory (or video file with --video). Overrides batch.input_dir.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory. Overrides batch.output_dir.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fit every video frame independently instead of tracking.
    #[arg(long)]
    no_keep_state: bool,

    /// Treat the input as video instead of still images.
    #[cfg(feature = "video")]
    #[arg(long)]
    video: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !cli.config.exists() {
        warn!("{} not found, using defaults", cli.config.display());
    }
    info!("Lane tracker starting");

    if let Some(input) = &cli.input {
        config.batch.input_dir = input.to_string_lossy().into_owned();
    }
    if let Some(output) = &cli.output {
        config.batch.output_dir = output.to_string_lossy().into_owned();
    }
    let keep_state = config.tracking.keep_state && !cli.no_keep_state;

    let mut orchestrator = FrameOrchestrator::from_config(&config)?.with_sink(Box::new(TracingSink));

    #[cfg(feature = "video")]
    if cli.video {
        run_videos(&mut orchestrator, &config, keep_state)?;
        log_summary(&orchestrator);
        return Ok(());
    }

    if !keep_state {
        info!("Still images are always fitted independently");
    }
    let report = batch::process_directory(&mut orchestrator, &config.batch)?;
    if report.processed == 0 {
        warn!("No images processed from {}", config.batch.input_dir);
    }
    log_summary(&orchestrator);
    Ok(())
}

#[cfg(feature = "video")]
fn run_videos(orchestrator: &mut FrameOrchestrator, config: &Config, keep_state: bool) -> Result<()> {
    use lane_tracker::video_processor::VideoProcessor;
    use std::path::Path;
    use tracing::error;

    let processor = VideoProcessor::new(&config.batch);
    let videos = processor.find_video_files(Path::new(&config.batch.input_dir))?;
    if videos.is_empty() {
        warn!("No video files found in {}", config.batch.input_dir);
        return Ok(());
    }

    for (idx, path) in videos.iter().enumerate() {
        info!("Processing video {}/{}: {}", idx + 1, videos.len(), path.display());
        match processor.process_video(orchestrator, path, keep_state) {
            Ok(stats) => info!(
                "Done: {} frames, {} with offset, {:.1} FPS",
                stats.total_frames, stats.frames_with_offset, stats.avg_fps
            ),
            Err(e) => error!("Failed to process video {}: {:#}", path.display(), e),
        }
    }
    Ok(())
}

fn log_summary(orchestrator: &FrameOrchestrator) {
    let summary = orchestrator.metrics().summary();
    match serde_yaml::to_string(&summary) {
        Ok(text) => info!("Session metrics:\n{}", text),
        Err(e) => warn!("Could not serialize metrics: {}", e),
    }
}
