//! flowsub core library
//!
//! Schedules scrolling ("danmaku") captions into a fixed set of display lanes
//! and turns them into an FFmpeg `drawtext` filter graph.
//!
//! # Example
//!
//! ```rust,ignore
//! use flowsub_core::{FlowConfig, FrameRate, LaneScheduler};
//!
//! let fps: FrameRate = "30000/1001".parse()?;
//! let mut scheduler = LaneScheduler::new(&FlowConfig::default(), fps);
//! let first = scheduler.place("hello", 0);
//! assert_eq!(first.lane, 0);
//! ```

pub mod config;
pub mod drawtext;
pub mod ffmpeg;
pub mod filter_graph;
pub mod lanes;
pub mod patcher;
pub mod process;

mod error;
pub use error::*;

mod types;
pub use types::*;

pub use config::{CaptionRequest, CaptionScript, EncodeSettings, FlowConfig};
pub use drawtext::{DrawInstruction, DrawStyle, MotionParams};
pub use filter_graph::FilterGraph;
pub use lanes::{LaneScheduler, LANE_COUNT};
pub use patcher::FlowPatcher;
