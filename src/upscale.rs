//! Upscale dispatch
//!
//! The strategy is picked once per run. Whatever it produces is forced to
//! the run's target size before it reaches the sink, since the encoder is
//! opened with fixed dimensions.

use crate::config::ScaleRequest;
use crate::error::{Error, Result};
use crate::processing::{resize, Kernel, ResizeTarget};
use crate::sr::{SharedModelCache, SrModelHandle};
use crate::types::{Frame, Resolution};
use std::path::Path;
use std::sync::Arc;

/// Kernel used for the corrective resize
pub const CORRECTIVE_KERNEL: Kernel = Kernel::Area;

/// How frames are upscaled for a whole run
#[derive(Debug, Clone)]
pub enum UpscaleStrategy {
    /// Classical resampling with a fixed kernel
    Classical(Kernel),
    /// A loaded super-resolution model
    Learned(Arc<SrModelHandle>),
}

impl UpscaleStrategy {
    /// Pick the strategy for a run.
    ///
    /// With a model path the model must load; a failure is returned rather
    /// than quietly falling back to classical resampling.
    pub fn resolve(
        kernel: Kernel,
        model_path: Option<&Path>,
        cache: &SharedModelCache,
    ) -> Result<Self> {
        match model_path {
            Some(path) => {
                let handle = cache.lock().load(path)?;
                Ok(UpscaleStrategy::Learned(handle))
            }
            None => Ok(UpscaleStrategy::Classical(kernel)),
        }
    }

    pub fn is_learned(&self) -> bool {
        matches!(self, UpscaleStrategy::Learned(_))
    }
}

impl std::fmt::Display for UpscaleStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpscaleStrategy::Classical(kernel) => write!(f, "classical ({})", kernel),
            UpscaleStrategy::Learned(model) => match model.native_scale() {
                Some(scale) => write!(f, "learned ({}, {}x)", model.path().display(), scale),
                None => write!(f, "learned ({})", model.path().display()),
            },
        }
    }
}

/// Per-frame dispatcher bound to one source size and one target size
#[derive(Debug)]
pub struct Upscaler {
    strategy: UpscaleStrategy,
    target: Resolution,
    resize_target: ResizeTarget,
    requested_scale: f64,
}

impl Upscaler {
    /// Compute the target for `source` and bind the strategy to it
    pub fn new(strategy: UpscaleStrategy, source: Resolution, request: &ScaleRequest) -> Result<Self> {
        let target = request.target_for(source)?;
        let resize_target = match *request {
            ScaleRequest::Factor(f) => ResizeTarget::Factor(f),
            _ => ResizeTarget::Exact(target),
        };

        Ok(Self {
            strategy,
            target,
            resize_target,
            requested_scale: request.nominal_factor(source),
        })
    }

    pub fn strategy(&self) -> &UpscaleStrategy {
        &self.strategy
    }

    /// Size of every frame this upscaler returns
    pub fn target(&self) -> Resolution {
        self.target
    }

    /// Upscale one frame to exactly `target()`
    pub fn upscale(&self, frame: &Frame) -> Result<Frame> {
        let produced = match &self.strategy {
            UpscaleStrategy::Classical(kernel) => resize(frame, self.resize_target, *kernel)?,
            UpscaleStrategy::Learned(model) => model.infer(frame, self.requested_scale)?,
        };
        self.reconcile(produced)
    }

    fn reconcile(&self, frame: Frame) -> Result<Frame> {
        if frame.resolution() == self.target {
            return Ok(frame);
        }

        tracing::debug!(
            "Corrective resize of frame {}: {} -> {}",
            frame.pts,
            frame.resolution(),
            self.target
        );
        let fixed = resize(&frame, ResizeTarget::Exact(self.target), CORRECTIVE_KERNEL)?;
        if fixed.resolution() != self.target {
            return Err(Error::FrameTransform(format!(
                "frame {} is {} and cannot be resized to {}",
                frame.pts,
                fixed.resolution(),
                self.target
            )));
        }
        Ok(fixed)
    }
}
