//! UpscaleFx — frame-accurate video upscaling
//!
//! Decodes a video, upscales every frame with either a classical resampling
//! kernel or a learned super-resolution model, and encodes the result at a
//! fixed output size.
//!
//! # Features
//!
//! - **Input**: FFmpeg decoding of any container/codec it supports
//! - **Upscale**: nearest/linear/cubic/area/lanczos kernels, or an ONNX model
//! - **Output**: MP4, AVI, MKV with a one-shot codec fallback
//!
//! # Example
//!
//! ```rust,no_run
//! use upscalefx::{CancelToken, Kernel, Pipeline, UpscaleConfig};
//!
//! fn main() -> upscalefx::Result<()> {
//!     let config = UpscaleConfig::new("clip.mp4", "clip_2x.mp4")
//!         .with_scale_factor(2.0)
//!         .with_kernel(Kernel::Lanczos);
//!
//!     let report = Pipeline::new(config).run(&CancelToken::new())?;
//!     println!("{} frames written", report.frames_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod encode;
pub mod error;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod sr;
pub mod types;
pub mod upscale;

// Re-exports for convenience
pub use config::{ScaleRequest, UpscaleConfig};
pub use encode::Codec;
pub use error::{Error, Result};
pub use input::{open_source, probe, FrameSource};
pub use output::{open_sink, Container, FrameSink, SinkFactory, SinkSpec};
pub use pipeline::{CancelToken, Pipeline, PipelineReport, RunStatus};
pub use processing::{resize, Kernel, ResizeTarget};
pub use sr::{ModelCache, SharedModelCache, SrModelHandle};
pub use types::{Frame, Resolution, VideoProperties};
pub use upscale::{UpscaleStrategy, Upscaler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
