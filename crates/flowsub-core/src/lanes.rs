//! Lane Scheduler
//!
//! Assigns each caption to one of a fixed number of horizontal lanes so
//! that scrolling captions do not run over each other.
//!
//! # Placement rule
//!
//! Lanes are scanned top to bottom. A lane is taken when it is empty, or
//! when the new start time falls outside `[occupant.start, occupant.end - D/2]`
//! where `D` is the flow duration (integer division). The first such lane
//! wins. When every lane is busy the caption is forced into lane 0, so
//! captions may collide but are never dropped.
//!
//! Only the tracking window is overwritten on reuse. Instructions already
//! returned for earlier captions are unaffected.

use tracing::{debug, warn};

use crate::drawtext::{DrawInstruction, DrawStyle, MotionParams};
use crate::{CaptionRequest, FlowConfig, FrameRate, TimeWindow};

/// Number of display lanes.
pub const LANE_COUNT: usize = 5;

/// Stateful lane assignment for one run.
#[derive(Debug, Clone)]
pub struct LaneScheduler {
    lanes: [Option<TimeWindow>; LANE_COUNT],
    fps: FrameRate,
    flow_duration: u32,
    font_size: u32,
    line_padding: u32,
    style: DrawStyle,
}

impl LaneScheduler {
    /// Creates a scheduler with all lanes empty.
    ///
    /// `config` is expected to have passed [`FlowConfig::validate`].
    pub fn new(config: &FlowConfig, fps: FrameRate) -> Self {
        Self {
            lanes: [None; LANE_COUNT],
            fps,
            flow_duration: config.flow_duration,
            font_size: config.font_size,
            line_padding: config.line_padding,
            style: DrawStyle::new(config.font_size, config.font_file.clone()),
        }
    }

    /// Tracked window per lane, `None` for lanes never used.
    pub fn lanes(&self) -> &[Option<TimeWindow>; LANE_COUNT] {
        &self.lanes
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.fps
    }

    /// Places one caption and returns its draw instruction.
    pub fn place(&mut self, text: impl Into<String>, start: u32) -> DrawInstruction {
        let text = text.into();
        let window = TimeWindow::starting_at(start, self.flow_duration);

        let lane = match self.free_lane(start) {
            Some(lane) => lane,
            None => {
                warn!(
                    "All {} lanes busy at t={}s, reusing lane 0 for {:?}",
                    LANE_COUNT, start, text
                );
                0
            }
        };
        self.lanes[lane] = Some(window);

        let y = self.vertical_offset(lane);
        debug!(lane, y, start, end = window.end, "Placed caption {:?}", text);

        DrawInstruction {
            text,
            lane,
            y,
            visible: window,
            motion: MotionParams {
                fps: self.fps,
                start,
                duration: self.flow_duration,
            },
            style: self.style.clone(),
        }
    }

    /// Places a batch of captions in order.
    pub fn place_all<'a, I>(&mut self, captions: I) -> Vec<DrawInstruction>
    where
        I: IntoIterator<Item = &'a CaptionRequest>,
    {
        captions
            .into_iter()
            .map(|caption| self.place(caption.text.clone(), caption.start))
            .collect()
    }

    /// First lane whose occupant does not block a caption starting at `start`.
    fn free_lane(&self, start: u32) -> Option<usize> {
        let tolerance = self.flow_duration / 2;
        self.lanes.iter().position(|lane| match lane {
            None => true,
            Some(window) => {
                let blocking = window.start <= start && start <= window.end - tolerance;
                !blocking
            }
        })
    }

    // Padding and font size both scale with the lane index. Saturates for
    // configs that skipped validation so placement never panics.
    fn vertical_offset(&self, lane: usize) -> u32 {
        let lane = lane as u32;
        self.line_padding
            .saturating_mul(lane)
            .saturating_add(self.font_size.saturating_mul(lane))
    }
}
