use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use lightsheet::{read_frame_tiff, ComputeContext, FrameOutcome, RunSession, SessionConfig};

/// Replays a directory of TIFF frames through a light-sheet run session.
#[derive(Parser, Debug)]
#[command(name = "lightsheet", version, about, long_about = None)]
struct Args {
    /// YAML session configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Directory of single-plane TIFF frames, replayed in file name order
    #[arg(short, long)]
    frames: PathBuf,

    /// Suffix of the dataset directory name
    #[arg(long, default_value = "replay")]
    run_name: String,

    /// Overrides the configured output root
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Process on the CPU instead of the GPU
    #[arg(long)]
    cpu: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    common::setup_logging(&args.log_level, &args.log_dir, "lightsheet")?;

    let mut config = SessionConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    if let Some(output) = &args.output {
        config.output_root = output.clone();
    }

    let frames = common::files_with_extensions(&args.frames, common::TIFF_EXTENSIONS)
        .with_context(|| format!("Failed to list frames in {}", args.frames.display()))?;
    if frames.is_empty() {
        bail!("No TIFF frames found in {}", args.frames.display());
    }

    if args.cpu {
        return replay(lightsheet::CpuContext::new(), config, &frames, &args.run_name);
    }
    replay_default(config, &frames, &args.run_name)
}

#[cfg(feature = "wgpu")]
fn replay_default(config: SessionConfig, frames: &[PathBuf], run_name: &str) -> Result<()> {
    let ctx = lightsheet::WgpuContext::new().context("Failed to initialize GPU")?;
    replay(ctx, config, frames, run_name)
}

#[cfg(not(feature = "wgpu"))]
fn replay_default(config: SessionConfig, frames: &[PathBuf], run_name: &str) -> Result<()> {
    tracing::warn!("built without GPU support, processing on the CPU");
    replay(lightsheet::CpuContext::new(), config, frames, run_name)
}

fn replay<C: ComputeContext>(
    ctx: C,
    config: SessionConfig,
    frames: &[PathBuf],
    run_name: &str,
) -> Result<()> {
    let mut session = RunSession::new(ctx, config);
    let dataset_dir = session
        .reset(run_name)
        .context("Failed to start run")?
        .to_path_buf();

    let mut stacks = 0usize;
    let mut failed_saves = 0usize;
    for path in frames {
        let frame = read_frame_tiff(path)
            .with_context(|| format!("Failed to read frame {}", path.display()))?;

        match session.frame_arrived(&frame) {
            Ok(FrameOutcome::StackCompleted(report)) => {
                stacks += 1;
                failed_saves += report.save_errors.len();
                println!(
                    "timepoint {:>6}: {}",
                    report.timepoint,
                    describe_output(report.stack_path.as_deref(), &dataset_dir)
                );
            }
            Ok(_) => {}
            Err(err) if session.is_aborted() => {
                return Err(err).with_context(|| format!("Run aborted at {}", path.display()));
            }
            // Already logged by the session, the replay goes on with the next frame.
            Err(_) => {}
        }
    }

    tracing::info!(
        frames = session.frame_counter(),
        stacks,
        failed_saves,
        dataset = %dataset_dir.display(),
        "replay finished"
    );
    if session.has_in_flight_volume() {
        tracing::warn!("last stack is incomplete and was not saved");
    }

    Ok(())
}

fn describe_output(stack_path: Option<&Path>, dataset_dir: &Path) -> String {
    match stack_path {
        Some(path) => path
            .strip_prefix(dataset_dir)
            .unwrap_or(path)
            .display()
            .to_string(),
        None => "processed, stack not saved".to_string(),
    }
}
