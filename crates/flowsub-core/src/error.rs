//! flowsub Error Definitions
//!
//! Pipeline-level errors. Runner-level failures are wrapped according to the
//! stage that produced them, so callers can tell a failed probe from a failed
//! encode.

use thiserror::Error;

use crate::ffmpeg::FFmpegError;

/// Core pipeline error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // External Collaborator Errors
    // =========================================================================
    /// Frame-rate probe failed (timeout, unreadable file, no video stream).
    #[error("Probe failed: {0}")]
    Probe(#[source] FFmpegError),

    /// Render/encode step failed.
    #[error("Encode failed: {0}")]
    Encode(#[source] FFmpegError),

    // =========================================================================
    // Input Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    #[error("Caption script error: {0}")]
    Script(String),
}

/// Result type alias for core operations
pub type CoreResult<T> = Result<T, CoreError>;
