//! Run Configuration
//!
//! Parameters that stay fixed for the whole run, plus the caption script
//! format used to feed captions from a file.
//!
//! Script files are JSON:
//!
//! ```json
//! {
//!   "config": { "flowDuration": 5, "fontSize": 50, "linePadding": 15 },
//!   "captions": [ { "text": "hello", "start": 0 } ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::lanes::LANE_COUNT;
use crate::{CoreError, CoreResult};

/// Font used when none is configured.
pub const DEFAULT_FONT_FILE: &str = "/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc";

// =============================================================================
// Flow Configuration
// =============================================================================

/// Parameters shared by every caption placement in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowConfig {
    /// Seconds a caption stays on screen while scrolling
    #[serde(default = "default_flow_duration")]
    pub flow_duration: u32,

    /// Font size in pixels
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// Extra pixels between lanes
    #[serde(default = "default_line_padding")]
    pub line_padding: u32,

    /// Font file handed to drawtext
    #[serde(default = "default_font_file")]
    pub font_file: PathBuf,

    /// Upper bound for the ffprobe call
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Output encoding options
    #[serde(default)]
    pub encode: EncodeSettings,
}

fn default_flow_duration() -> u32 {
    5
}

fn default_font_size() -> u32 {
    50
}

fn default_line_padding() -> u32 {
    15
}

fn default_font_file() -> PathBuf {
    PathBuf::from(DEFAULT_FONT_FILE)
}

fn default_probe_timeout() -> u64 {
    5
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            flow_duration: default_flow_duration(),
            font_size: default_font_size(),
            line_padding: default_line_padding(),
            font_file: default_font_file(),
            probe_timeout_secs: default_probe_timeout(),
            encode: EncodeSettings::default(),
        }
    }
}

impl FlowConfig {
    /// Checks the constraints the scheduler relies on.
    pub fn validate(&self) -> CoreResult<()> {
        if self.flow_duration == 0 {
            return Err(CoreError::InvalidConfig(
                "flow duration must be a positive number of seconds".to_string(),
            ));
        }
        if self.font_size == 0 {
            return Err(CoreError::InvalidConfig(
                "font size must be positive".to_string(),
            ));
        }
        if self.probe_timeout_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "probe timeout must be positive".to_string(),
            ));
        }
        if self.font_file.as_os_str().is_empty() {
            return Err(CoreError::InvalidConfig("font file is empty".to_string()));
        }
        if self.bottom_lane_offset().is_none() {
            return Err(CoreError::InvalidConfig(format!(
                "font size {} plus line padding {} is too large to stack {} lanes",
                self.font_size, self.line_padding, LANE_COUNT
            )));
        }
        self.encode.validate()
    }

    /// Vertical offset of the last lane, `None` if it does not fit in a `u32`.
    fn bottom_lane_offset(&self) -> Option<u32> {
        let last_lane = u32::try_from(LANE_COUNT - 1).ok()?;
        self.font_size
            .checked_add(self.line_padding)?
            .checked_mul(last_lane)
    }
}

// =============================================================================
// Encode Settings
// =============================================================================

/// Output encoding options. Unset fields leave FFmpeg's defaults in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncodeSettings {
    /// Video codec (e.g., "libx264")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,

    /// Encoder preset (e.g., "medium")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,

    /// CRF value for quality-based encoding (0-51, lower is better)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,

    /// Copy the source audio track (if any) into the output
    #[serde(default = "default_true")]
    pub keep_audio: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: None,
            preset: None,
            crf: None,
            keep_audio: true,
        }
    }
}

impl EncodeSettings {
    fn validate(&self) -> CoreResult<()> {
        if let Some(crf) = self.crf {
            if crf > 51 {
                return Err(CoreError::InvalidConfig(format!(
                    "crf must be between 0 and 51, got {}",
                    crf
                )));
            }
        }
        Ok(())
    }

    /// Output-side FFmpeg arguments for these settings.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.keep_audio {
            args.extend(["-map".to_string(), "0:a?".to_string()]);
            args.extend(["-c:a".to_string(), "copy".to_string()]);
        }
        if let Some(codec) = &self.video_codec {
            args.extend(["-c:v".to_string(), codec.clone()]);
        }
        if let Some(preset) = &self.preset {
            args.extend(["-preset".to_string(), preset.clone()]);
        }
        if let Some(crf) = self.crf {
            args.extend(["-crf".to_string(), crf.to_string()]);
        }

        args
    }
}

// =============================================================================
// Caption Requests
// =============================================================================

/// One caption to place: text plus start time in whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptionRequest {
    pub text: String,
    pub start: u32,
}

impl CaptionRequest {
    pub fn new(text: impl Into<String>, start: u32) -> Self {
        Self {
            text: text.into(),
            start,
        }
    }
}

/// Configuration plus an ordered caption list, loadable from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CaptionScript {
    #[serde(default)]
    pub config: FlowConfig,

    #[serde(default)]
    pub captions: Vec<CaptionRequest>,
}

impl CaptionScript {
    /// Reads a script file.
    ///
    /// The config block is not validated here: callers may still override
    /// fields, and [`crate::FlowPatcher`] validates the final config.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Script(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let script = Self::from_json(&content)?;
        info!(
            "Loaded caption script {} ({} captions)",
            path.display(),
            script.captions.len()
        );
        Ok(script)
    }

    /// Parses script JSON.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CoreError::Script(format!("Failed to parse caption script: {}", e)))
    }

    /// The caption set burned in by the original authoring run.
    pub fn demo() -> Self {
        Self {
            config: FlowConfig::default(),
            captions: vec![
                CaptionRequest::new("ほげ", 0),
                CaptionRequest::new("ほげほげほげほげほげひおげほげ", 4),
                CaptionRequest::new("popopo", 4),
                CaptionRequest::new("popopopopo", 10),
            ],
        }
    }
}
