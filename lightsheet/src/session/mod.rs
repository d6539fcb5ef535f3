//! Run session: the frame-arrival and reset entry points.
//!
//! A [`RunSession`] owns the compute context, the configuration and the state
//! of the current run. Every entry point takes `&mut self`, so one session has
//! exactly one writer and frames are handled strictly in call order.


use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::adapter::FrameAdapter;
use crate::assembler::{CompletedStack, StackAssembler};
use crate::compute::{ComputeContext, DeviceBuffer};
use crate::config::{ProcessingConfig, SessionConfig};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::pipeline::ProcessingPipeline;
use crate::sink::OutputSink;

/// Timestamp prefix of dataset directory names.
pub const DATASET_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Files produced for one completed stack.
#[derive(Debug, Default)]
pub struct StackReport {
    pub timepoint: u64,
    pub stack_path: Option<PathBuf>,
    pub projection_path: Option<PathBuf>,
    /// Save failures. The stack is not retried and the run continues.
    pub save_errors: Vec<Error>,
}

impl StackReport {
    fn new(timepoint: u64) -> Self {
        Self {
            timepoint,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.save_errors.is_empty()
    }
}

/// What happened to one arrived frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// Post-processing is disabled, the frame only advanced the counter.
    Ignored,
    /// The frame was copied into Z-plane `slice` of the in-flight volume.
    Collected { frame_index: u64, slice: u32 },
    /// The frame closed a stack, which was processed and saved.
    StackCompleted(StackReport),
}

#[derive(Debug)]
struct RunState<B> {
    dataset_name: String,
    sink: OutputSink,
    depth: u32,
    frame_counter: u64,
    assembler: StackAssembler<B>,
    aborted: bool,
}

/// Turns a stream of frames into saved, processed stacks.
#[derive(Debug)]
pub struct RunSession<C: ComputeContext> {
    ctx: C,
    config: SessionConfig,
    run: Option<RunState<C::Buffer>>,
}

impl<C: ComputeContext> RunSession<C> {
    /// Creates an idle session. Call [`RunSession::reset`] before delivering frames.
    pub fn new(ctx: C, config: SessionConfig) -> Self {
        Self {
            ctx,
            config,
            run: None,
        }
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mutable configuration. Z-range and output root take effect at the next
    /// reset, processing settings at the next frame.
    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    /// Starts a new run named after the current local time and `run_name`.
    pub fn reset(&mut self, run_name: &str) -> Result<&Path> {
        self.reset_at(run_name, Local::now().naive_local())
    }

    /// Starts a new run whose dataset directory is
    /// `<output_root>/<started_at>_<run_name>`.
    ///
    /// Any in-flight volume of the previous run is released first. When the
    /// configuration is invalid no run is started.
    pub fn reset_at(&mut self, run_name: &str, started_at: NaiveDateTime) -> Result<&Path> {
        if let Some(mut previous) = self.run.take() {
            previous.assembler.clear(&self.ctx);
            tracing::debug!(
                dataset = %previous.dataset_name,
                frames = previous.frame_counter,
                "previous run closed"
            );
        }

        self.config.validate()?;
        let depth = self.config.z_range.stack_depth()?;

        let dataset_name = format!(
            "{}_{}",
            started_at.format(DATASET_TIMESTAMP_FORMAT),
            run_name
        );
        let output_root = common::normalize_separators(&self.config.output_root.to_string_lossy());
        let sink = OutputSink::new(PathBuf::from(output_root).join(&dataset_name));

        tracing::info!(
            dataset = %dataset_name,
            depth,
            path = %sink.dataset_dir().display(),
            "run started"
        );

        let run = self.run.insert(RunState {
            dataset_name,
            sink,
            depth,
            frame_counter: 0,
            assembler: StackAssembler::new(),
            aborted: false,
        });
        Ok(run.sink.dataset_dir())
    }

    /// Handles one arrived frame: collects it and, when it closes a stack,
    /// processes and saves the stack before returning.
    ///
    /// The frame counter advances even when the frame is rejected, so later
    /// frames keep their Z position.
    pub fn frame_arrived(&mut self, frame: &Frame<'_>) -> Result<FrameOutcome> {
        let Self { ctx, config, run } = self;
        let ctx = &*ctx;
        let run = run.as_mut().ok_or(Error::NotStarted)?;
        if run.aborted {
            return Err(Error::RunAborted);
        }

        let frame_index = run.frame_counter;
        run.frame_counter += 1;

        tracing::debug!(
            frame_index,
            width = frame.width,
            height = frame.height,
            z_um = frame.metadata.z_position_um,
            elapsed_ms = frame.metadata.elapsed_time_ms,
            "frame arrived"
        );

        let processing = config.processing;
        if !processing.do_post_processing {
            return Ok(FrameOutcome::Ignored);
        }

        let slice = match FrameAdapter::adapt(ctx, frame) {
            Ok(slice) => slice,
            Err(err) => return Err(run.fail(ctx, frame_index, err)),
        };
        let collected = run.assembler.collect(ctx, &slice, frame_index, run.depth);
        ctx.release(slice);

        match collected {
            Ok(None) => Ok(FrameOutcome::Collected {
                frame_index,
                slice: (frame_index % run.depth as u64) as u32,
            }),
            Ok(Some(stack)) => run
                .process_stack(ctx, &processing, stack)
                .map(FrameOutcome::StackCompleted)
                .map_err(|err| run.fail(ctx, frame_index, err)),
            Err(err) => Err(run.fail(ctx, frame_index, err)),
        }
    }

    /// Number of frames delivered since the last reset.
    pub fn frame_counter(&self) -> u64 {
        self.run.as_ref().map_or(0, |run| run.frame_counter)
    }

    pub fn is_started(&self) -> bool {
        self.run.is_some()
    }

    pub fn is_aborted(&self) -> bool {
        self.run.as_ref().is_some_and(|run| run.aborted)
    }

    pub fn depth(&self) -> Option<u32> {
        self.run.as_ref().map(|run| run.depth)
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.run.as_ref().map(|run| run.dataset_name.as_str())
    }

    pub fn dataset_dir(&self) -> Option<&Path> {
        self.run.as_ref().map(|run| run.sink.dataset_dir())
    }

    pub fn has_in_flight_volume(&self) -> bool {
        self.run.as_ref().is_some_and(|run| run.assembler.has_volume())
    }
}

impl<B: DeviceBuffer> RunState<B> {
    /// Logs a frame error and aborts the run when the error leaves it inconsistent.
    fn fail<C>(&mut self, ctx: &C, frame_index: u64, err: Error) -> Error
    where
        C: ComputeContext<Buffer = B>,
    {
        if err.aborts_run() {
            self.assembler.clear(ctx);
            self.aborted = true;
            tracing::error!(
                frame_index,
                dataset = %self.dataset_name,
                error = %err,
                "run aborted"
            );
        } else {
            tracing::warn!(frame_index, error = %err, "frame skipped");
        }
        err
    }

    fn process_stack<C>(
        &self,
        ctx: &C,
        processing: &ProcessingConfig,
        stack: CompletedStack<B>,
    ) -> Result<StackReport>
    where
        C: ComputeContext<Buffer = B>,
    {
        let CompletedStack { volume, timepoint } = stack;

        let pipeline = match ProcessingPipeline::from_config(processing) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                ctx.release(volume);
                return Err(err);
            }
        };
        let processed = pipeline.process(ctx, volume, timepoint)?;

        let mut report = StackReport::new(timepoint);
        let mut fatal = None;

        if processing.save_stack_enabled {
            match self.sink.save(ctx, &processed, timepoint) {
                Ok(path) => report.stack_path = Some(path),
                Err(err) if err.aborts_run() => fatal = Some(err),
                Err(err) => {
                    tracing::error!(timepoint, error = %err, "failed to save stack");
                    report.save_errors.push(err);
                }
            }
        }

        if processing.save_projection_enabled && fatal.is_none() {
            match self.sink.save_projection(ctx, &processed, timepoint) {
                Ok(path) => report.projection_path = Some(path),
                Err(err) if err.aborts_run() => fatal = Some(err),
                Err(err) => {
                    tracing::error!(timepoint, error = %err, "failed to save projection");
                    report.save_errors.push(err);
                }
            }
        }

        ctx.release(processed);
        if let Some(err) = fatal {
            return Err(err);
        }

        tracing::info!(
            timepoint,
            dataset = %self.dataset_name,
            stages = pipeline.stages().len(),
            saved_stack = report.stack_path.is_some(),
            saved_projection = report.projection_path.is_some(),
            "stack completed"
        );
        Ok(report)
    }
}
