//! Output module
//!
//! Frame sinks for the upscale pipeline:
//! - File output (MP4, AVI, MKV) through the FFmpeg muxer
//! - In-memory capture (for testing)

mod file;
mod memory;

pub use file::{staging_path, FileOutput, FileSinkFactory};
pub use memory::{MemorySink, MemorySinkFactory};

use crate::encode::Codec;
use crate::error::Result;
use crate::types::{Frame, Resolution};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Container format for file output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Container {
    /// MP4 (.mp4) - Wide compatibility
    #[default]
    Mp4,
    /// AVI (.avi) - Legacy, FourCC keyed
    Avi,
    /// Matroska (.mkv)
    Matroska,
}

impl Container {
    /// Pick the container from a file extension. Unknown or missing
    /// extensions fall back to MP4 with a warning.
    pub fn from_path(path: &Path) -> Container {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("mp4") | Some("m4v") => Container::Mp4,
            Some("avi") => Container::Avi,
            Some("mkv") => Container::Matroska,
            other => {
                tracing::warn!(
                    "Unrecognized output extension {:?} for {}, writing MP4",
                    other.unwrap_or(""),
                    path.display()
                );
                Container::Mp4
            }
        }
    }

    /// Get file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Avi => "avi",
            Container::Matroska => "mkv",
        }
    }

    /// Get FFmpeg format name
    pub fn ffmpeg_format(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Avi => "avi",
            Container::Matroska => "matroska",
        }
    }

    /// Codec tried first
    pub fn primary_codec(&self) -> Codec {
        match self {
            Container::Mp4 => Codec::Mpeg4,
            Container::Avi => Codec::Xvid,
            Container::Matroska => Codec::H264,
        }
    }

    /// Codec tried once when the first choice cannot be opened
    pub fn fallback_codec(&self) -> Codec {
        match self {
            Container::Mp4 => Codec::Xvid,
            Container::Avi | Container::Matroska => Codec::Mpeg4,
        }
    }

    /// Codecs to try, in order. A preferred codec replaces the primary; the
    /// fallback still applies. At most two entries, never duplicated.
    pub fn codec_preference(&self, preferred: Option<Codec>) -> Vec<Codec> {
        let first = preferred.unwrap_or_else(|| self.primary_codec());
        let second = if self.fallback_codec() != first {
            self.fallback_codec()
        } else {
            self.primary_codec()
        };

        if second == first {
            vec![first]
        } else {
            vec![first, second]
        }
    }

    /// Container keys the stream on its FourCC tag
    pub fn uses_fourcc(&self) -> bool {
        matches!(self, Container::Avi)
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Parameters an output is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub path: PathBuf,
    /// Every written frame must have exactly this size
    pub resolution: Resolution,
    pub fps: f64,
    pub preferred_codec: Option<Codec>,
}

/// Trait for frame sinks
pub trait FrameSink {
    /// Dimensions the sink was opened with
    fn resolution(&self) -> Resolution;

    /// Write one frame.
    ///
    /// Returns `Ok(false)` without writing when the sink is already closed.
    /// A frame the sink cannot take is a per-frame `FrameTransform` error.
    fn write_frame(&mut self, frame: &Frame) -> Result<bool>;

    /// Flush and finalize. Calling it again does nothing.
    fn close(&mut self) -> Result<()>;

    /// Close without keeping the output, removing only what this sink
    /// created. Does nothing once `close` has run.
    fn discard(&mut self) -> Result<()>;

    /// Frames accepted so far
    fn frames_written(&self) -> u64;

    fn is_open(&self) -> bool;
}

/// Opens sinks for the pipeline
pub trait SinkFactory {
    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>>;
}

/// Open a file sink, selecting container and codec from the path
pub fn open_sink(spec: &SinkSpec) -> Result<Box<dyn FrameSink>> {
    FileSinkFactory.open(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_from_extension() {
        assert_eq!(Container::from_path(Path::new("a.mp4")), Container::Mp4);
        assert_eq!(Container::from_path(Path::new("a.AVI")), Container::Avi);
        assert_eq!(Container::from_path(Path::new("dir/a.mkv")), Container::Matroska);
        assert_eq!(Container::from_path(Path::new("a.webm")), Container::Mp4);
        assert_eq!(Container::from_path(Path::new("noext")), Container::Mp4);
    }

    #[test]
    fn test_container_ffmpeg_formats() {
        assert_eq!(Container::Mp4.ffmpeg_format(), "mp4");
        assert_eq!(Container::Avi.ffmpeg_format(), "avi");
        assert_eq!(Container::Matroska.ffmpeg_format(), "matroska");
    }

    #[test]
    fn test_codec_preference_table() {
        assert_eq!(
            Container::Mp4.codec_preference(None),
            vec![Codec::Mpeg4, Codec::Xvid]
        );
        assert_eq!(
            Container::Avi.codec_preference(None),
            vec![Codec::Xvid, Codec::Mpeg4]
        );
        assert_eq!(
            Container::Matroska.codec_preference(None),
            vec![Codec::H264, Codec::Mpeg4]
        );
    }

    #[test]
    fn test_preferred_codec_replaces_primary() {
        assert_eq!(
            Container::Mp4.codec_preference(Some(Codec::H264)),
            vec![Codec::H264, Codec::Xvid]
        );
        // Preferring the fallback keeps the primary as the second try
        assert_eq!(
            Container::Avi.codec_preference(Some(Codec::Mpeg4)),
            vec![Codec::Mpeg4, Codec::Xvid]
        );
        assert_eq!(
            Container::Mp4.codec_preference(Some(Codec::Mpeg4)),
            vec![Codec::Mpeg4, Codec::Xvid]
        );
    }
}
