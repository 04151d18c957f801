//! FFmpeg Runner Module
//!
//! Runs ffprobe to resolve the source frame rate and ffmpeg to burn the
//! caption filter graph into the output file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{FFmpegError, FFmpegInfo, FFmpegResult};
use crate::config::EncodeSettings;
use crate::filter_graph::VIDEO_OUTPUT_LABEL;
use crate::process::piped_command;
use crate::FrameRate;

/// Lines of stderr kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Progress information reported by `ffmpeg -progress`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FFmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current processing speed (fps)
    pub fps: f32,
    /// Current output time position
    pub time_sec: f64,
    /// Set on the final report
    pub finished: bool,
}

/// Accumulates `key=value` lines into progress reports.
///
/// FFmpeg emits a block of keys followed by `progress=continue` (or
/// `progress=end`); a report is produced at each `progress=` line.
#[derive(Debug, Default)]
struct ProgressParser {
    current: FFmpegProgress,
}

impl ProgressParser {
    fn feed(&mut self, line: &str) -> Option<FFmpegProgress> {
        let (key, value) = line.split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "frame" => self.current.frame = value.parse().unwrap_or(self.current.frame),
            "fps" => self.current.fps = value.parse().unwrap_or(self.current.fps),
            // Both keys are microseconds despite the name.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<u64>() {
                    self.current.time_sec = us as f64 / 1_000_000.0;
                }
            }
            "progress" => {
                self.current.finished = value == "end";
                return Some(self.current.clone());
            }
            _ => {}
        }
        None
    }
}

// =============================================================================
// FFprobe JSON Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct FFprobeOutput {
    streams: Option<Vec<FFprobeStream>>,
}

#[derive(Debug, Deserialize)]
struct FFprobeStream {
    codec_type: Option<String>,
    r_frame_rate: Option<String>,
}

/// Extract the frame rate of the first video stream from ffprobe JSON
fn parse_probe_frame_rate(json_str: &str) -> FFmpegResult<FrameRate> {
    let output: FFprobeOutput = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let stream = output
        .streams
        .unwrap_or_default()
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FFmpegError::ProbeError("No video stream found".to_string()))?;

    let raw = stream
        .r_frame_rate
        .ok_or_else(|| FFmpegError::ProbeError("Video stream has no frame rate".to_string()))?;

    raw.parse::<FrameRate>()
        .map_err(|e| FFmpegError::ProbeError(e.to_string()))
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// FFmpeg Runner for the probe and render steps
#[derive(Clone)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
}

impl FFmpegRunner {
    /// Create a new FFmpegRunner from detected FFmpeg installation
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    /// Get the FFmpeg info
    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    /// Probe the declared frame rate (`r_frame_rate`) of the first video stream.
    ///
    /// The ffprobe child is killed if it does not finish within `timeout`.
    pub async fn probe_frame_rate(&self, input: &Path, timeout: Duration) -> FFmpegResult<FrameRate> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let mut cmd = piped_command(&self.info.ffprobe_path);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-select_streams",
            "v:0",
        ])
        .arg(input);

        let child = cmd.spawn().map_err(FFmpegError::ProcessError)?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(FFmpegError::ProcessError)?,
            Err(_) => {
                warn!(
                    "FFprobe did not finish within {:?} for {}",
                    timeout,
                    input.display()
                );
                return Err(FFmpegError::Timeout);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!(
                "FFprobe failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let fps = parse_probe_frame_rate(&String::from_utf8_lossy(&output.stdout))?;
        debug!("Probed {} at {} fps", input.display(), fps);
        Ok(fps)
    }

    /// Render `filter_complex` over `input` into `output`, overwriting it.
    ///
    /// The filter graph must end in the `[vout]` label. Progress reports are
    /// sent to `progress_tx` when given; a closed receiver is ignored.
    pub async fn render(
        &self,
        input: &Path,
        output: &Path,
        filter_complex: &str,
        settings: &EncodeSettings,
        progress_tx: Option<mpsc::Sender<FFmpegProgress>>,
    ) -> FFmpegResult<()> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                FFmpegError::OutputError(format!("Failed to create output directory: {}", e))
            })?;
        }

        let mut cmd = piped_command(&self.info.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-i")
            .arg(input)
            .args(["-filter_complex", filter_complex])
            .args(["-map", &format!("[{}]", VIDEO_OUTPUT_LABEL)])
            .args(settings.to_args())
            .args(["-progress", "pipe:1", "-nostats"])
            .arg("-y") // Overwrite output
            .arg(output);

        info!("Rendering {} -> {}", input.display(), output.display());
        let mut child = cmd.spawn().map_err(FFmpegError::ProcessError)?;

        // Both pipes are drained so ffmpeg never blocks on a full buffer.
        let progress_task = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut parser = ProgressParser::default();
                let mut tx = progress_tx;

                while let Ok(Some(line)) = lines.next_line().await {
                    let Some(progress) = parser.feed(&line) else {
                        continue;
                    };
                    debug!(
                        frame = progress.frame,
                        fps = progress.fps,
                        time_sec = progress.time_sec,
                        "Render progress"
                    );
                    let closed = match &tx {
                        Some(sender) => sender.send(progress).await.is_err(),
                        None => false,
                    };
                    if closed {
                        tx = None;
                    }
                }
            })
        });

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let status = child.wait().await.map_err(FFmpegError::ProcessError)?;

        if let Some(task) = progress_task {
            let _ = task.await;
        }
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(FFmpegError::ExecutionFailed(format!(
                "Render failed ({}): {}",
                status,
                tail_lines(&stderr, STDERR_TAIL_LINES)
            )));
        }

        info!("Render finished: {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "30/1",
                    "pix_fmt": "yuv420p"
                }
            ]
        }"#;

        let fps = parse_probe_frame_rate(json).unwrap();
        assert_eq!(fps, FrameRate { num: 30, den: 1 });
    }

    #[test]
    fn test_parse_fractional_framerate() {
        let json = r#"{
            "streams": [
                { "codec_type": "audio", "r_frame_rate": "0/0" },
                { "codec_type": "video", "r_frame_rate": "30000/1001" }
            ]
        }"#;

        let fps = parse_probe_frame_rate(json).unwrap();
        assert_eq!(fps.to_string(), "30000/1001");
    }

    #[test]
    fn test_parse_probe_without_video_stream() {
        let json = r#"{ "streams": [ { "codec_type": "audio" } ] }"#;
        assert!(matches!(
            parse_probe_frame_rate(json),
            Err(FFmpegError::ProbeError(_))
        ));

        assert!(matches!(
            parse_probe_frame_rate("{}"),
            Err(FFmpegError::ProbeError(_))
        ));
    }

    #[test]
    fn test_parse_probe_unknown_frame_rate() {
        let json = r#"{ "streams": [ { "codec_type": "video", "r_frame_rate": "0/0" } ] }"#;
        assert!(matches!(
            parse_probe_frame_rate(json),
            Err(FFmpegError::ProbeError(_))
        ));
    }

    #[test]
    fn test_parse_probe_garbage() {
        assert!(matches!(
            parse_probe_frame_rate("not json"),
            Err(FFmpegError::ParseError(_))
        ));
    }

    #[test]
    fn test_progress_parser() {
        let mut parser = ProgressParser::default();
        assert_eq!(parser.feed("frame=42"), None);
        assert_eq!(parser.feed("fps=29.5"), None);
        assert_eq!(parser.feed("out_time_us=1500000"), None);
        assert_eq!(parser.feed("speed=1.2x"), None);
        assert_eq!(parser.feed("garbage line"), None);

        let report = parser.feed("progress=continue").unwrap();
        assert_eq!(report.frame, 42);
        assert_eq!(report.fps, 29.5);
        assert_eq!(report.time_sec, 1.5);
        assert!(!report.finished);

        assert_eq!(parser.feed("frame=90"), None);
        let report = parser.feed("progress=end").unwrap();
        assert_eq!(report.frame, 90);
        assert!(report.finished);
    }

    #[test]
    fn test_tail_lines() {
        assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("", 5), "");
    }

    #[tokio::test]
    async fn test_probe_missing_input_does_not_spawn() {
        let runner = FFmpegRunner::new(FFmpegInfo::from_paths(
            "/nonexistent/ffmpeg",
            "/nonexistent/ffprobe",
        ));
        let result = runner
            .probe_frame_rate(Path::new("/nonexistent/input.mp4"), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(FFmpegError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_render_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let runner = FFmpegRunner::new(FFmpegInfo::from_paths("ffmpeg", "ffprobe"));

        let result = runner
            .render(
                Path::new("/nonexistent/input.mp4"),
                &output,
                "[0:v]null[vout]",
                &EncodeSettings::default(),
                None,
            )
            .await;
        assert!(matches!(result, Err(FFmpegError::InvalidInput(_))));
        assert!(!output.exists());
    }

    #[cfg(unix)]
    mod fake_binaries {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn fake_binary(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn input_file(dir: &Path) -> PathBuf {
            let path = dir.join("input.mp4");
            std::fs::write(&path, b"not really a video").unwrap();
            path
        }

        #[tokio::test]
        async fn test_probe_reads_frame_rate() {
            let dir = tempfile::tempdir().unwrap();
            let ffprobe = fake_binary(
                dir.path(),
                "ffprobe",
                r#"echo '{"streams":[{"codec_type":"video","r_frame_rate":"24000/1001"}]}'"#,
            );
            let runner = FFmpegRunner::new(FFmpegInfo::from_paths("ffmpeg", ffprobe));

            let fps = runner
                .probe_frame_rate(&input_file(dir.path()), Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(fps, FrameRate { num: 24000, den: 1001 });
        }

        #[tokio::test]
        async fn test_probe_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let ffprobe = fake_binary(dir.path(), "ffprobe", "sleep 10");
            let runner = FFmpegRunner::new(FFmpegInfo::from_paths("ffmpeg", ffprobe));

            let started = std::time::Instant::now();
            let result = runner
                .probe_frame_rate(&input_file(dir.path()), Duration::from_millis(200))
                .await;
            assert!(matches!(result, Err(FFmpegError::Timeout)));
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[tokio::test]
        async fn test_probe_failure_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let ffprobe = fake_binary(
                dir.path(),
                "ffprobe",
                "echo 'Invalid data found when processing input' >&2\nexit 1",
            );
            let runner = FFmpegRunner::new(FFmpegInfo::from_paths("ffmpeg", ffprobe));

            let result = runner
                .probe_frame_rate(&input_file(dir.path()), Duration::from_secs(5))
                .await;
            match result {
                Err(FFmpegError::ProbeError(msg)) => assert!(msg.contains("Invalid data")),
                other => panic!("Unexpected probe result: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_render_reports_progress_and_writes_output() {
            let dir = tempfile::tempdir().unwrap();
            // Writes its last argument (the output path) and prints two progress blocks.
            let ffmpeg = fake_binary(
                dir.path(),
                "ffmpeg",
                r#"for last; do :; done
printf 'frame=15\nfps=30.0\nout_time_us=500000\nprogress=continue\nframe=30\nout_time_us=1000000\nprogress=end\n'
: > "$last""#,
            );
            let runner = FFmpegRunner::new(FFmpegInfo::from_paths(ffmpeg, "ffprobe"));
            let output = dir.path().join("nested").join("out.mp4");
            let (tx, mut rx) = mpsc::channel(16);

            runner
                .render(
                    &input_file(dir.path()),
                    &output,
                    "[0:v]null[vout]",
                    &EncodeSettings::default(),
                    Some(tx),
                )
                .await
                .unwrap();

            assert!(output.exists());

            let mut reports = Vec::new();
            while let Some(report) = rx.recv().await {
                reports.push(report);
            }
            assert_eq!(reports.len(), 2);
            assert_eq!(reports[0].frame, 15);
            assert_eq!(reports[0].time_sec, 0.5);
            assert!(!reports[0].finished);
            assert_eq!(reports[1].frame, 30);
            assert!(reports[1].finished);
        }

        #[tokio::test]
        async fn test_render_passes_filter_and_overwrite_flag() {
            let dir = tempfile::tempdir().unwrap();
            let args_file = dir.path().join("args.txt");
            let ffmpeg = fake_binary(
                dir.path(),
                "ffmpeg",
                &format!(
                    r#"for arg; do printf '%s\n' "$arg"; done > '{}'"#,
                    args_file.display()
                ),
            );
            let runner = FFmpegRunner::new(FFmpegInfo::from_paths(ffmpeg, "ffprobe"));
            let output = dir.path().join("out.mp4");

            runner
                .render(
                    &input_file(dir.path()),
                    &output,
                    "[0:v]null[vout]",
                    &EncodeSettings::default(),
                    None,
                )
                .await
                .unwrap();

            let args = std::fs::read_to_string(&args_file).unwrap();
            let args: Vec<&str> = args.lines().collect();
            let filter_pos = args.iter().position(|a| *a == "-filter_complex").unwrap();
            assert_eq!(args[filter_pos + 1], "[0:v]null[vout]");
            assert!(args.windows(2).any(|w| w == ["-map", "[vout]"]));
            assert!(args.windows(2).any(|w| w == ["-map", "0:a?"]));
            assert!(args.contains(&"-y"));
            assert_eq!(*args.last().unwrap(), output.to_string_lossy());
        }

        #[tokio::test]
        async fn test_render_failure_carries_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let ffmpeg = fake_binary(
                dir.path(),
                "ffmpeg",
                "echo 'Cannot find a valid font for the family Sans' >&2\nexit 1",
            );
            let runner = FFmpegRunner::new(FFmpegInfo::from_paths(ffmpeg, "ffprobe"));

            let result = runner
                .render(
                    &input_file(dir.path()),
                    &dir.path().join("out.mp4"),
                    "[0:v]null[vout]",
                    &EncodeSettings::default(),
                    None,
                )
                .await;
            match result {
                Err(FFmpegError::ExecutionFailed(msg)) => {
                    assert!(msg.contains("Cannot find a valid font"))
                }
                other => panic!("Unexpected render result: {:?}", other),
            }
        }
    }
}
