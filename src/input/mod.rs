//! Input module
//!
//! Frame sources for the upscale pipeline:
//! - Video files decoded through FFmpeg
//! - Synthetic gradient frames (for testing and benchmarks)

mod file;
mod synthetic;

pub use file::FileInput;
pub use synthetic::SyntheticSource;

use crate::error::{Error, Result};
use crate::types::{Frame, VideoProperties};
use std::path::Path;
use std::time::Duration;

/// Trait for frame sources
pub trait FrameSource {
    /// Properties reported when the source was opened
    fn properties(&self) -> &VideoProperties;

    /// Decode the next frame as packed RGB24.
    ///
    /// `Ok(None)` marks the end of the stream. A recoverable error means only
    /// this frame was lost and reading may continue.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the decoder. Calling it again does nothing.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Options for opening a file source
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Demuxer read timeout, for protocols that honor `rw_timeout`
    pub io_timeout: Option<Duration>,
}

/// Open a video file for sequential decoding
pub fn open_source(path: &Path, options: &SourceOptions) -> Result<Box<dyn FrameSource>> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    Ok(Box::new(FileInput::open(path, options)?))
}

/// Read a file's properties without decoding any frame
pub fn probe(path: &Path) -> Result<VideoProperties> {
    let mut source = open_source(path, &SourceOptions::default())?;
    let properties = source.properties().clone();
    source.close();
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mp4");
        assert!(matches!(
            open_source(&missing, &SourceOptions::default()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(probe(&missing), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_open_garbage_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.mp4");
        std::fs::write(&path, b"definitely not a video container").unwrap();
        assert!(matches!(
            open_source(&path, &SourceOptions::default()),
            Err(Error::SourceUnreadable(_))
        ));
    }
}
