//! Error types for UpscaleFx

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for UpscaleFx operations
pub type Result<T> = std::result::Result<T, Error>;

/// UpscaleFx error type
#[derive(Error, Debug)]
pub enum Error {
    // Setup errors
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Source/sink errors
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("Sink could not be opened: {0}")]
    SinkUnopenable(String),

    // Model errors
    #[error("Model runtime unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    // Per-frame errors
    #[error("Frame transform failed: {0}")]
    FrameTransform(String),

    // Run outcome errors
    #[error("No frames written to {} ({frames_read} frames read)", .output.display())]
    EmptyResult { output: PathBuf, frames_read: u64 },

    #[error("Run cancelled after {frames_written} of {frames_read} frames")]
    Cancelled { frames_read: u64, frames_written: u64 },

    // FFmpeg errors
    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error only affects a single frame
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::FrameTransform(_))
    }

    /// Check if this error is raised before the frame loop starts
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidParameter(_)
                | Error::Config(_)
                | Error::SourceUnreadable(_)
                | Error::SinkUnopenable(_)
                | Error::ModelUnavailable(_)
                | Error::ModelLoad(_)
        )
    }
}

impl From<ffmpeg_next::Error> for Error {
    fn from(e: ffmpeg_next::Error) -> Self {
        Error::FFmpeg(e.to_string())
    }
}
