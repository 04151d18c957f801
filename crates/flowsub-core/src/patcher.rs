//! Flow Patcher
//!
//! The whole run in one object: resolve the frame rate, place captions,
//! then hand the resulting filter graph to FFmpeg.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut patcher = FlowPatcher::open(runner, "in.mp4", "out.mp4", FlowConfig::default()).await?;
//! patcher.flow_text("hello", 0);
//! patcher.flow_text("world", 4);
//! patcher.run(None).await?;
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::ffmpeg::{FFmpegProgress, FFmpegRunner};
use crate::{
    CaptionRequest, CoreError, CoreResult, DrawInstruction, FilterGraph, FlowConfig, FrameRate,
    LaneScheduler,
};

/// Probe → place → render pipeline for one input/output pair
pub struct FlowPatcher {
    runner: FFmpegRunner,
    input: PathBuf,
    output: PathBuf,
    config: FlowConfig,
    scheduler: LaneScheduler,
    instructions: Vec<DrawInstruction>,
}

impl FlowPatcher {
    /// Validates `config` and probes the input's frame rate.
    ///
    /// Fails with [`CoreError::Probe`] before any placement can happen if the
    /// frame rate cannot be resolved.
    pub async fn open(
        runner: FFmpegRunner,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        config: FlowConfig,
    ) -> CoreResult<Self> {
        config.validate()?;
        let input = input.into();

        let timeout = Duration::from_secs(config.probe_timeout_secs);
        let fps = runner
            .probe_frame_rate(&input, timeout)
            .await
            .map_err(CoreError::Probe)?;
        info!("Input {} runs at {} fps", input.display(), fps);

        Self::with_frame_rate(runner, input, output, config, fps)
    }

    /// Builds a patcher for a frame rate the caller already knows.
    pub fn with_frame_rate(
        runner: FFmpegRunner,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        config: FlowConfig,
        fps: FrameRate,
    ) -> CoreResult<Self> {
        config.validate()?;
        let scheduler = LaneScheduler::new(&config, fps);

        Ok(Self {
            runner,
            input: input.into(),
            output: output.into(),
            config,
            scheduler,
            instructions: Vec::new(),
        })
    }

    /// Places a caption and records its draw instruction.
    pub fn flow_text(&mut self, text: impl Into<String>, start: u32) -> &DrawInstruction {
        let instruction = self.scheduler.place(text, start);
        self.instructions.push(instruction);
        &self.instructions[self.instructions.len() - 1]
    }

    /// Places every caption in order.
    pub fn flow_all(&mut self, captions: &[CaptionRequest]) {
        let placed = self.scheduler.place_all(captions);
        self.instructions.extend(placed);
    }

    pub fn instructions(&self) -> &[DrawInstruction] {
        &self.instructions
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.scheduler.frame_rate()
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Draw instructions chained in placement order.
    pub fn filter_graph(&self) -> FilterGraph {
        self.instructions.iter().cloned().collect()
    }

    /// Encodes the output. Any existing file at the output path is replaced.
    ///
    /// Failures are reported as [`CoreError::Encode`]; a partially written
    /// output is left in place.
    pub async fn run(self, progress_tx: Option<mpsc::Sender<FFmpegProgress>>) -> CoreResult<()> {
        let graph = self.filter_graph();
        info!(
            "Burning {} captions into {}",
            graph.len(),
            self.output.display()
        );
        let filter_complex = graph.to_default_filter_complex();

        self.runner
            .render(
                &self.input,
                &self.output,
                &filter_complex,
                &self.config.encode,
                progress_tx,
            )
            .await
            .map_err(CoreError::Encode)
    }
}
