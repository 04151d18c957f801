//! Drawtext Instructions
//!
//! A placed caption, fully resolved: lane, vertical offset, visibility window,
//! horizontal motion and the fixed styling. Converts to a single FFmpeg
//! `drawtext` filter.
//!
//! # Example
//!
//! ```rust,ignore
//! let filter = instruction.to_filter_string("0:v", "v0");
//! // Returns: "[0:v]drawtext=text=\'hello\':x='w-(w+tw)*clip(...)':y=0:...[v0]"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{FrameRate, TimeWindow};

// Option values are unescaped in stages before drawtext sees them:
//
// 1. filtergraph parser: `[`, `]`, `,` and `;` end the filter; `\` and `'` escape.
// 2. option parser: `:` ends the value; `\` and `'` escape.
// 3. drawtext expansion (text only): `%` starts an expansion; `\` escapes.
//
// Values are encoded in the reverse order.

/// Escapes `\` and `%` so drawtext draws the text literally.
fn escape_drawtext_expansion(raw: &str) -> String {
    raw.replace('\\', r"\\").replace('%', r"\%")
}

/// Single-quotes a value for the option parser. A literal `'` cannot appear
/// inside quotes, so it closes the quote, is escaped, and reopens it.
fn quote_option_value(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Backslash-escapes every character the filtergraph parser would consume.
fn escape_graph_value(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Option value that reaches the filter unchanged.
fn literal_option_value(raw: &str) -> String {
    escape_graph_value(&quote_option_value(raw))
}

// =============================================================================
// Style
// =============================================================================

/// Fixed caption styling. Only the font size and font file vary per run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawStyle {
    pub font_size: u32,
    pub font_file: PathBuf,
    pub font_color: String,
    pub border_width: u32,
    pub box_enabled: bool,
    pub box_border_width: u32,
    pub alpha: f64,
}

impl DrawStyle {
    pub fn new(font_size: u32, font_file: impl Into<PathBuf>) -> Self {
        Self {
            font_size,
            font_file: font_file.into(),
            font_color: "white".to_string(),
            border_width: 2,
            box_enabled: false,
            box_border_width: 10,
            alpha: 0.8,
        }
    }

    fn to_params(&self) -> String {
        format!(
            "fontsize={}:fontcolor={}:fontfile={}:borderw={}:box={}:boxborderw={}:alpha={}",
            self.font_size,
            self.font_color,
            literal_option_value(&self.font_file.to_string_lossy()),
            self.border_width,
            u8::from(self.box_enabled),
            self.box_border_width,
            self.alpha
        )
    }
}

// =============================================================================
// Motion
// =============================================================================

/// Parameters of the right-to-left scroll.
///
/// At frame `n` the caption's left edge sits at
/// `w - (w + tw) * clamp01((n - start*fps) / (fps*duration))`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionParams {
    pub fps: FrameRate,
    pub start: u32,
    pub duration: u32,
}

impl MotionParams {
    /// The `x` expression evaluated per frame by drawtext.
    pub fn x_expression(&self) -> String {
        format!(
            "w-(w+tw)*clip((n-{}*{})/({}*{}),0,1)",
            self.start, self.fps, self.fps, self.duration
        )
    }

    /// Scroll progress in `[0, 1]` at frame index `n`.
    pub fn progress_at(&self, frame: f64) -> f64 {
        let fps = self.fps.as_f64();
        let raw = (frame - self.start as f64 * fps) / (fps * self.duration as f64);
        raw.clamp(0.0, 1.0)
    }

    /// Horizontal position at frame `n` for the given frame and text widths.
    pub fn x_at(&self, frame: f64, frame_width: f64, text_width: f64) -> f64 {
        frame_width - (frame_width + text_width) * self.progress_at(frame)
    }
}

// =============================================================================
// Draw Instruction
// =============================================================================

/// One caption ready for the filter graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawInstruction {
    pub text: String,
    /// Lane index, 0 is the top row
    pub lane: usize,
    /// Vertical offset in pixels
    pub y: u32,
    /// Seconds during which the caption is drawn (inclusive at both ends)
    pub visible: TimeWindow,
    pub motion: MotionParams,
    pub style: DrawStyle,
}

impl DrawInstruction {
    /// The drawtext `enable` expression.
    pub fn enable_expression(&self) -> String {
        format!("between(t,{},{})", self.visible.start, self.visible.end)
    }

    /// Whether the caption is drawn at `t` seconds.
    pub fn is_visible_at(&self, t: f64) -> bool {
        self.visible.contains_inclusive(t)
    }

    /// drawtext parameters without stream labels.
    pub fn filter_params(&self) -> String {
        format!(
            "text={}:x='{}':y={}:{}:enable='{}'",
            literal_option_value(&escape_drawtext_expansion(&self.text)),
            self.motion.x_expression(),
            self.y,
            self.style.to_params(),
            self.enable_expression()
        )
    }

    /// Full filter in the form `[input]drawtext=...[output]`.
    pub fn to_filter_string(&self, input_label: &str, output_label: &str) -> String {
        format!(
            "[{}]drawtext={}[{}]",
            input_label,
            self.filter_params(),
            output_label
        )
    }
}
