//! Upscale pipeline
//!
//! Connects source → upscale → sink, one frame at a time. A frame that fails
//! to transform or encode is skipped and counted; anything else ends the run.
//! Source and sink are closed on every exit path, and a sink that ends up
//! with no frames is discarded instead of finalized.

use crate::config::UpscaleConfig;
use crate::error::{Error, Result};
use crate::input::{self, FrameSource, SourceOptions};
use crate::output::{FileSinkFactory, FrameSink, SinkFactory, SinkSpec};
use crate::sr::{ModelCache, SharedModelCache};
use crate::types::Resolution;
use crate::upscale::{UpscaleStrategy, Upscaler};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// External stop signal, checked before each frame
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a finished run went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every frame read was written
    Complete,
    /// Some frames were skipped or the source ended early
    Partial,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "complete"),
            RunStatus::Partial => write!(f, "partial"),
        }
    }
}

/// Summary of a run that wrote at least one frame
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub output: PathBuf,
    pub frames_read: u64,
    pub frames_written: u64,
    pub frames_skipped: u64,
    /// Source failed before its end of stream
    pub source_truncated: bool,
    pub source_resolution: Resolution,
    pub target_resolution: Resolution,
    pub fps: f64,
    pub strategy: String,
    pub elapsed: Duration,
    pub status: RunStatus,
}

#[derive(Debug, Default)]
struct LoopCounts {
    read: u64,
    written: u64,
    skipped: u64,
    truncated: bool,
}

/// Upscale pipeline
pub struct Pipeline {
    config: UpscaleConfig,
    models: SharedModelCache,
}

impl Pipeline {
    /// Create a pipeline with its own ONNX model cache
    pub fn new(config: UpscaleConfig) -> Self {
        let models = ModelCache::onnx(config.inference_timeout()).into_shared();
        Self { config, models }
    }

    /// Use a model cache shared with other runs
    pub fn with_model_cache(mut self, models: SharedModelCache) -> Self {
        self.models = models;
        self
    }

    pub fn config(&self) -> &UpscaleConfig {
        &self.config
    }

    pub fn model_cache(&self) -> &SharedModelCache {
        &self.models
    }

    /// Validate, open the input file and run into a file output
    pub fn run(&self, cancel: &CancelToken) -> Result<PipelineReport> {
        self.config.validate()?;
        let source = input::open_source(
            &self.config.input,
            &SourceOptions {
                io_timeout: self.config.io_timeout(),
            },
        )?;
        self.run_with(source, &FileSinkFactory, cancel)
    }

    /// Run from an already open source into sinks from `sinks`.
    /// The source is closed before returning.
    pub fn run_with(
        &self,
        mut source: Box<dyn FrameSource>,
        sinks: &dyn SinkFactory,
        cancel: &CancelToken,
    ) -> Result<PipelineReport> {
        let result = self.drive(source.as_mut(), sinks, cancel);
        source.close();

        match &result {
            Ok(report) => tracing::info!(
                "Run {}: {} read, {} written, {} skipped in {:.1}s -> {}",
                report.status,
                report.frames_read,
                report.frames_written,
                report.frames_skipped,
                report.elapsed.as_secs_f64(),
                report.output.display()
            ),
            Err(e) => tracing::error!("Run failed: {}", e),
        }
        result
    }

    fn drive(
        &self,
        source: &mut dyn FrameSource,
        sinks: &dyn SinkFactory,
        cancel: &CancelToken,
    ) -> Result<PipelineReport> {
        let started = Instant::now();
        let properties = source.properties().clone();
        let fps = properties.effective_fps(self.config.default_fps);
        if fps != properties.fps {
            tracing::warn!(
                "Source reports implausible frame rate {}, using {}",
                properties.fps,
                fps
            );
        }

        // Strategy before sink: a model that fails to load leaves no output behind
        let strategy = UpscaleStrategy::resolve(
            self.config.kernel,
            self.config.model_path.as_deref(),
            &self.models,
        )?;
        let upscaler = Upscaler::new(strategy, properties.resolution, &self.config.scale)?;

        tracing::info!(
            "Upscaling {} -> {} @ {:.3} fps with {}",
            properties.resolution,
            upscaler.target(),
            fps,
            upscaler.strategy()
        );

        let spec = SinkSpec {
            path: self.config.output.clone(),
            resolution: upscaler.target(),
            fps,
            preferred_codec: self.config.codec,
        };
        let mut sink = sinks.open(&spec)?;

        let outcome = self.frame_loop(source, sink.as_mut(), &upscaler, properties.frame_count, cancel);
        let written = sink.frames_written();
        // A sink with no frames is thrown away rather than finalized
        let finished = if written == 0 {
            sink.discard()
        } else {
            sink.close()
        };
        drop(sink);

        let counts = match outcome {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(close_err) = finished {
                    tracing::warn!("Failed to close {}: {}", spec.path.display(), close_err);
                }
                return Err(e);
            }
        };

        if counts.written == 0 {
            if let Err(close_err) = finished {
                tracing::warn!("Failed to discard {}: {}", spec.path.display(), close_err);
            }
            return Err(Error::EmptyResult {
                output: spec.path,
                frames_read: counts.read,
            });
        }
        finished?;

        let status = if counts.skipped == 0 && !counts.truncated {
            RunStatus::Complete
        } else {
            RunStatus::Partial
        };

        Ok(PipelineReport {
            output: spec.path,
            frames_read: counts.read,
            frames_written: counts.written,
            frames_skipped: counts.skipped,
            source_truncated: counts.truncated,
            source_resolution: properties.resolution,
            target_resolution: upscaler.target(),
            fps,
            strategy: upscaler.strategy().to_string(),
            elapsed: started.elapsed(),
            status,
        })
    }

    fn frame_loop(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        upscaler: &Upscaler,
        expected: Option<u64>,
        cancel: &CancelToken,
    ) -> Result<LoopCounts> {
        let mut counts = LoopCounts::default();
        let interval = self.config.progress_interval;

        loop {
            if cancel.is_cancelled() {
                tracing::warn!("Cancelled after {} frames", counts.read);
                return Err(Error::Cancelled {
                    frames_read: counts.read,
                    frames_written: counts.written,
                });
            }

            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    counts.read += 1;
                    counts.skipped += 1;
                    tracing::warn!("Skipping undecodable frame {}: {}", counts.read - 1, e);
                    continue;
                }
                Err(e) => {
                    tracing::error!("Source failed after {} frames: {}", counts.read, e);
                    counts.truncated = true;
                    break;
                }
            };
            counts.read += 1;

            match upscaler
                .upscale(&frame)
                .and_then(|upscaled| sink.write_frame(&upscaled))
            {
                Ok(true) => {
                    counts.written += 1;
                    if interval > 0 && counts.written % interval == 0 {
                        match expected {
                            Some(total) => tracing::info!(
                                "Progress: {}/{} frames written",
                                counts.written,
                                total
                            ),
                            None => tracing::info!("Progress: {} frames written", counts.written),
                        }
                    }
                }
                Ok(false) => counts.skipped += 1,
                Err(e) if e.is_recoverable() => {
                    counts.skipped += 1;
                    tracing::warn!("Skipping frame {}: {}", frame.pts, e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(counts)
    }
}
