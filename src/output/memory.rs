//! In-memory output (for testing)

use crate::error::{Error, Result};
use crate::types::{Frame, Resolution};
use parking_lot::Mutex;
use std::sync::Arc;

use super::{FrameSink, SinkFactory, SinkSpec};

/// Collects written frames instead of encoding them
pub struct MemorySink {
    resolution: Resolution,
    frames: Arc<Mutex<Vec<Frame>>>,
    written: u64,
    open: bool,
}

impl MemorySink {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            frames: Arc::new(Mutex::new(Vec::new())),
            written: 0,
            open: true,
        }
    }

    /// Shared handle to the captured frames
    pub fn frames(&self) -> Arc<Mutex<Vec<Frame>>> {
        self.frames.clone()
    }
}

impl FrameSink for MemorySink {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<bool> {
        if !self.open {
            tracing::warn!("Dropping frame {}: sink is closed", frame.pts);
            return Ok(false);
        }
        if frame.resolution() != self.resolution {
            return Err(Error::FrameTransform(format!(
                "frame is {}, sink expects {}",
                frame.resolution(),
                self.resolution
            )));
        }
        self.frames.lock().push(frame.clone());
        self.written += 1;
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        // Sinks from one factory are used one at a time, so ours are the tail
        let mut frames = self.frames.lock();
        let keep = frames.len().saturating_sub(self.written as usize);
        frames.truncate(keep);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Hands out `MemorySink`s and remembers what it opened
#[derive(Default, Clone)]
pub struct MemorySinkFactory {
    frames: Arc<Mutex<Vec<Frame>>>,
    specs: Arc<Mutex<Vec<SinkSpec>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame written to any sink this factory opened
    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    /// Specs of the sinks opened so far
    pub fn opened(&self) -> Vec<SinkSpec> {
        self.specs.lock().clone()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>> {
        self.specs.lock().push(spec.clone());
        let mut sink = MemorySink::new(spec.resolution);
        sink.frames = self.frames.clone();
        Ok(Box::new(sink))
    }
}
