//! Core Type Definitions
//!
//! Frame rate and time-window primitives shared by the scheduler and the
//! filter generator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

// =============================================================================
// Frame Rate
// =============================================================================

/// Frame rate as a rational number (e.g. 30000/1001 for 29.97 fps).
///
/// Kept as numerator/denominator rather than a float so the generated
/// filter expression matches what ffprobe reported exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub den: u32,
}

impl FrameRate {
    /// Creates a new frame rate, rejecting zero components.
    pub fn new(num: u32, den: u32) -> CoreResult<Self> {
        if num == 0 || den == 0 {
            return Err(CoreError::InvalidFrameRate(format!("{}/{}", num, den)));
        }
        Ok(Self { num, den })
    }

    /// Converts to floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl FromStr for FrameRate {
    type Err = CoreError;

    /// Parses `"num/den"` (ffprobe `r_frame_rate`) or a bare integer `"25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidFrameRate("empty frame rate".to_string()));
        }

        let invalid = || CoreError::InvalidFrameRate(trimmed.to_string());

        match trimmed.split_once('/') {
            Some((num, den)) => {
                let num: u32 = num.trim().parse().map_err(|_| invalid())?;
                let den: u32 = den.trim().parse().map_err(|_| invalid())?;
                Self::new(num, den)
            }
            None => {
                let num: u32 = trimmed.parse().map_err(|_| invalid())?;
                Self::new(num, 1)
            }
        }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

// =============================================================================
// Time Window
// =============================================================================

/// Half-open time window `[start, end)` in whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: u32,
    pub end: u32,
}

impl TimeWindow {
    /// Window starting at `start` lasting `duration` seconds.
    pub fn starting_at(start: u32, duration: u32) -> Self {
        Self {
            start,
            end: start.saturating_add(duration),
        }
    }

    /// Visibility test used by the drawtext `enable` expression:
    /// true for `start <= t <= end`, inclusive at both ends.
    pub fn contains_inclusive(&self, t: f64) -> bool {
        t >= self.start as f64 && t <= self.end as f64
    }
}
