//! FFmpeg Filter Graph
//!
//! Chains draw instructions into a single `-filter_complex` string, one
//! drawtext stage per caption in placement order.
//!
//! ```text
//! [0:v]drawtext=...[v0];[v0]drawtext=...[v1];[v1]drawtext=...[vout]
//! ```

use crate::DrawInstruction;

/// Default input label (first video stream of the first input)
pub const VIDEO_INPUT_LABEL: &str = "0:v";

/// Default output label mapped to the encoder
pub const VIDEO_OUTPUT_LABEL: &str = "vout";

/// Sequential drawtext stages over one video stream
#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    stages: Vec<DrawInstruction>,
}

impl FilterGraph {
    /// Creates a new empty filter graph
    pub fn new() -> Self {
        Self { stages: vec![] }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Generates the filter_complex string
    ///
    /// # Arguments
    ///
    /// * `input_label` - Input stream label (e.g., "0:v")
    /// * `output_label` - Final output label (e.g., "vout")
    pub fn to_filter_complex(&self, input_label: &str, output_label: &str) -> String {
        if self.stages.is_empty() {
            return format!("[{input_label}]null[{output_label}]");
        }

        let mut filters = Vec::with_capacity(self.stages.len());
        let mut current_label = input_label.to_string();

        for (i, stage) in self.stages.iter().enumerate() {
            let is_last = i == self.stages.len() - 1;
            let next_label = if is_last {
                output_label.to_string()
            } else {
                format!("v{}", i)
            };

            filters.push(stage.to_filter_string(&current_label, &next_label));
            current_label = next_label;
        }

        filters.join(";")
    }

    /// Filter complex using the default `[0:v]` → `[vout]` labels
    pub fn to_default_filter_complex(&self) -> String {
        self.to_filter_complex(VIDEO_INPUT_LABEL, VIDEO_OUTPUT_LABEL)
    }
}

impl FromIterator<DrawInstruction> for FilterGraph {
    fn from_iter<T: IntoIterator<Item = DrawInstruction>>(iter: T) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}
