//! flowsub CLI
//!
//! Burns scrolling danmaku-style captions into a video with FFmpeg.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use flowsub_core::ffmpeg::{detect_system_ffmpeg, FFmpegInfo, FFmpegProgress, FFmpegRunner};
use flowsub_core::{CaptionRequest, CaptionScript, DrawInstruction, FlowConfig, FlowPatcher, FrameRate};

#[derive(Parser)]
#[command(name = "flowsub")]
#[command(about = "Overlay right-to-left scrolling captions onto a video")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the ffmpeg binary (detected when omitted)
    #[arg(long, global = true)]
    ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe binary (detected when omitted)
    #[arg(long, global = true)]
    ffprobe: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render captions into a new video file
    Render {
        /// Input video file path
        input: PathBuf,

        /// Output video file path (overwritten if it exists)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        captions: CaptionArgs,

        /// Output video codec (e.g. libx264)
        #[arg(long)]
        codec: Option<String>,

        /// Encoder preset (e.g. medium)
        #[arg(long)]
        preset: Option<String>,

        /// CRF value (0-51)
        #[arg(long)]
        crf: Option<u8>,

        /// Drop the source audio track
        #[arg(long)]
        no_audio: bool,
    },

    /// Print lane placements and the filter graph as JSON without encoding
    Plan {
        /// Input video file path
        input: PathBuf,

        #[command(flatten)]
        captions: CaptionArgs,

        /// Use this frame rate (e.g. 30000/1001) instead of probing the input
        #[arg(long)]
        fps: Option<FrameRate>,
    },
}

#[derive(Args)]
struct CaptionArgs {
    /// JSON caption script with optional config block
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Caption as START:TEXT, START in whole seconds (repeatable)
    #[arg(short, long = "caption", value_parser = parse_caption)]
    captions: Vec<CaptionRequest>,

    /// Seconds each caption takes to cross the frame
    #[arg(long)]
    flow_duration: Option<u32>,

    /// Font size in pixels
    #[arg(long)]
    font_size: Option<u32>,

    /// Extra pixels between lanes
    #[arg(long)]
    line_padding: Option<u32>,

    /// Font file used by drawtext
    #[arg(long)]
    font_file: Option<PathBuf>,

    /// Seconds to wait for ffprobe
    #[arg(long)]
    probe_timeout: Option<u64>,
}

fn parse_caption(raw: &str) -> std::result::Result<CaptionRequest, String> {
    let (start, text) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected START:TEXT, got {:?}", raw))?;
    let start: u32 = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid start time {:?}", start))?;
    Ok(CaptionRequest::new(text, start))
}

impl CaptionArgs {
    /// Script config (or defaults) with command-line overrides applied, plus
    /// the caption list.
    fn resolve(&self) -> Result<(FlowConfig, Vec<CaptionRequest>)> {
        let script = match &self.script {
            Some(path) => CaptionScript::load(path)
                .with_context(|| format!("Failed to load caption script {}", path.display()))?,
            None => CaptionScript::default(),
        };

        let mut config = script.config;
        if let Some(value) = self.flow_duration {
            config.flow_duration = value;
        }
        if let Some(value) = self.font_size {
            config.font_size = value;
        }
        if let Some(value) = self.line_padding {
            config.line_padding = value;
        }
        if let Some(value) = &self.font_file {
            config.font_file = value.clone();
        }
        if let Some(value) = self.probe_timeout {
            config.probe_timeout_secs = value;
        }

        let captions = if !self.captions.is_empty() {
            self.captions.clone()
        } else if !script.captions.is_empty() {
            script.captions
        } else {
            warn!("No captions given, using the built-in demo captions");
            CaptionScript::demo().captions
        };

        Ok((config, captions))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Plan<'a> {
    input: &'a Path,
    fps: String,
    flow_duration: u32,
    instructions: &'a [DrawInstruction],
    filter_complex: String,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::prelude::*;

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout is reserved for command output (`plan` JSON).
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_runner(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Result<FFmpegRunner> {
    let info = match (ffmpeg, ffprobe) {
        (None, None) => detect_system_ffmpeg().context("Failed to locate ffmpeg/ffprobe")?,
        (ffmpeg, ffprobe) => FFmpegInfo::from_paths(
            ffmpeg.unwrap_or_else(|| PathBuf::from("ffmpeg")),
            ffprobe.unwrap_or_else(|| PathBuf::from("ffprobe")),
        ),
    };
    let runner = FFmpegRunner::new(info);
    info!(
        "Using ffmpeg {} ({})",
        runner.info().version,
        runner.info().ffmpeg_path.display()
    );
    Ok(runner)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Render {
            input,
            output,
            captions,
            codec,
            preset,
            crf,
            no_audio,
        } => {
            let (mut config, captions) = captions.resolve()?;
            if codec.is_some() {
                config.encode.video_codec = codec;
            }
            if preset.is_some() {
                config.encode.preset = preset;
            }
            if crf.is_some() {
                config.encode.crf = crf;
            }
            if no_audio {
                config.encode.keep_audio = false;
            }

            let runner = build_runner(cli.ffmpeg, cli.ffprobe)?;
            render(runner, input, output, config, &captions).await
        }

        Commands::Plan {
            input,
            captions,
            fps,
        } => {
            let (config, captions) = captions.resolve()?;
            plan(cli.ffmpeg, cli.ffprobe, input, config, &captions, fps).await
        }
    }
}

async fn render(
    runner: FFmpegRunner,
    input: PathBuf,
    output: PathBuf,
    config: FlowConfig,
    captions: &[CaptionRequest],
) -> Result<()> {
    let mut patcher = FlowPatcher::open(runner, &input, &output, config)
        .await
        .with_context(|| format!("Failed to read frame rate of {}", input.display()))?;
    patcher.flow_all(captions);

    let (tx, mut rx) = mpsc::channel::<FFmpegProgress>(32);
    let reporter = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            info!(
                "frame {} at {:.1}s ({:.1} fps)",
                progress.frame, progress.time_sec, progress.fps
            );
        }
    });

    let result = patcher.run(Some(tx)).await;
    let _ = reporter.await;
    result.with_context(|| format!("Failed to render {}", output.display()))?;

    info!("Wrote {}", output.display());
    Ok(())
}

async fn plan(
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    input: PathBuf,
    config: FlowConfig,
    captions: &[CaptionRequest],
    fps: Option<FrameRate>,
) -> Result<()> {
    // Nothing is encoded, so the output path is never used.
    let output = PathBuf::new();

    let mut patcher = match fps {
        Some(fps) => {
            let runner = FFmpegRunner::new(FFmpegInfo::from_paths(
                ffmpeg.unwrap_or_else(|| PathBuf::from("ffmpeg")),
                ffprobe.unwrap_or_else(|| PathBuf::from("ffprobe")),
            ));
            FlowPatcher::with_frame_rate(runner, &input, output, config, fps)?
        }
        None => {
            let runner = build_runner(ffmpeg, ffprobe)?;
            FlowPatcher::open(runner, &input, output, config)
                .await
                .with_context(|| format!("Failed to read frame rate of {}", input.display()))?
        }
    };
    patcher.flow_all(captions);

    let plan = Plan {
        input: &input,
        fps: patcher.frame_rate().to_string(),
        flow_duration: patcher.config().flow_duration,
        instructions: patcher.instructions(),
        filter_complex: patcher.filter_graph().to_default_filter_complex(),
    };
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_caption() {
        assert_eq!(
            parse_caption("4:hello").unwrap(),
            CaptionRequest::new("hello", 4)
        );
        // Only the first colon separates start from text.
        assert_eq!(
            parse_caption("10:12:30 meet").unwrap(),
            CaptionRequest::new("12:30 meet", 10)
        );
        assert!(parse_caption("no-colon").is_err());
        assert!(parse_caption("x:text").is_err());
        assert!(parse_caption("-1:text").is_err());
    }

    #[test]
    fn test_render_args_parse() {
        let cli = Cli::try_parse_from([
            "flowsub",
            "render",
            "in.mp4",
            "-o",
            "out.mp4",
            "-c",
            "0:first",
            "--caption",
            "3:second",
            "--flow-duration",
            "8",
            "--crf",
            "20",
            "--no-audio",
        ])
        .unwrap();

        match cli.command {
            Commands::Render {
                input,
                output,
                captions,
                crf,
                no_audio,
                ..
            } => {
                assert_eq!(input, PathBuf::from("in.mp4"));
                assert_eq!(output, PathBuf::from("out.mp4"));
                assert_eq!(crf, Some(20));
                assert!(no_audio);

                let (config, list) = captions.resolve().unwrap();
                assert_eq!(config.flow_duration, 8);
                assert_eq!(config.font_size, 50);
                assert_eq!(
                    list,
                    vec![
                        CaptionRequest::new("first", 0),
                        CaptionRequest::new("second", 3)
                    ]
                );
            }
            Commands::Plan { .. } => panic!("expected render"),
        }
    }

    #[test]
    fn test_plan_args_with_fps() {
        let cli = Cli::try_parse_from(["flowsub", "plan", "in.mp4", "--fps", "30000/1001", "-v"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Plan { fps, captions, .. } => {
                assert_eq!(fps, Some(FrameRate { num: 30000, den: 1001 }));
                // No captions given: falls back to the demo list.
                let (_, list) = captions.resolve().unwrap();
                assert_eq!(list, CaptionScript::demo().captions);
            }
            Commands::Render { .. } => panic!("expected plan"),
        }
    }

    #[test]
    fn test_script_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("captions.json");
        std::fs::write(
            &script,
            r#"{ "config": { "fontSize": 40, "linePadding": 5 }, "captions": [ { "text": "s", "start": 1 } ] }"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "flowsub",
            "plan",
            "in.mp4",
            "--script",
            script.to_str().unwrap(),
            "--font-size",
            "60",
        ])
        .unwrap();
        let Commands::Plan { captions, .. } = cli.command else {
            panic!("expected plan");
        };

        let (config, list) = captions.resolve().unwrap();
        assert_eq!(config.font_size, 60);
        assert_eq!(config.line_padding, 5);
        assert_eq!(list, vec![CaptionRequest::new("s", 1)]);
    }

    #[tokio::test]
    async fn test_flag_overrides_invalid_script_config() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("captions.json");
        std::fs::write(
            &script,
            r#"{ "config": { "flowDuration": 0 }, "captions": [ { "text": "s", "start": 1 } ] }"#,
        )
        .unwrap();
        let script = script.to_str().unwrap();

        let cli = Cli::try_parse_from([
            "flowsub",
            "plan",
            "in.mp4",
            "--script",
            script,
            "--flow-duration",
            "5",
        ])
        .unwrap();
        let Commands::Plan { captions, .. } = cli.command else {
            panic!("expected plan");
        };
        let (config, _) = captions.resolve().unwrap();
        assert_eq!(config.flow_duration, 5);
        assert!(config.validate().is_ok());

        // Without the override the final config is still rejected.
        let cli = Cli::try_parse_from(["flowsub", "plan", "in.mp4", "--script", script]).unwrap();
        let Commands::Plan { captions, .. } = cli.command else {
            panic!("expected plan");
        };
        let (config, list) = captions.resolve().unwrap();
        let err = plan(
            None,
            None,
            PathBuf::from("in.mp4"),
            config,
            &list,
            Some(FrameRate { num: 30, den: 1 }),
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid configuration"));
    }

    #[tokio::test]
    async fn test_render_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let runner = FFmpegRunner::new(FFmpegInfo::from_paths("ffmpeg", "ffprobe"));

        let result = render(
            runner,
            dir.path().join("missing.mp4"),
            output.clone(),
            FlowConfig::default(),
            &CaptionScript::demo().captions,
        )
        .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Probe failed"));
        assert!(!output.exists());
    }
}
