//! Synthetic source (for testing and benchmarks)

use crate::error::Result;
use crate::types::{FourCc, Frame, Resolution, VideoProperties};

use super::FrameSource;

/// Emits a fixed number of moving gradient frames
pub struct SyntheticSource {
    properties: VideoProperties,
    total: u64,
    next: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(resolution: Resolution, frames: u64, fps: f64) -> Self {
        Self {
            properties: VideoProperties {
                resolution,
                fps,
                codec_tag: FourCc::from_name("rgb3"),
                frame_count: Some(frames),
            },
            total: frames,
            next: 0,
            open: true,
        }
    }

    /// Render frame `index` without advancing the source
    pub fn render(resolution: Resolution, index: u64) -> Frame {
        let Resolution { width, height } = resolution;
        let shift = (index * 8) as u32;
        let mut data = Vec::with_capacity(Frame::expected_len(width, height));
        for y in 0..height {
            for x in 0..width {
                data.push((((x + shift) % width) * 255 / width) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push((index % 256) as u8);
            }
        }
        Frame::from_rgb(data, width, height).with_pts(index as i64)
    }
}

impl FrameSource for SyntheticSource {
    fn properties(&self) -> &VideoProperties {
        &self.properties
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if !self.open || self.next >= self.total {
            return Ok(None);
        }
        let frame = Self::render(self.properties.resolution, self.next);
        self.next += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
