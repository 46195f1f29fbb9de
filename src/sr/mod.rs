//! Learned super-resolution
//!
//! A model takes a single-image NHWC batch `[1, H, W, 3]` of floats in
//! `[0, 1]` and returns `[1, H*s, W*s, 3]`. Models are loaded through a
//! [`ModelLoader`] into a [`ModelCache`] owned by the run; every loaded model
//! runs on its own inference thread so calls can be bounded by a deadline.

mod cache;
mod onnx;
mod worker;

pub use cache::{ModelCache, ModelState, ModelStatus, SharedModelCache};
pub use onnx::{OnnxModel, OnnxModelLoader};
pub use worker::InferenceWorker;

use crate::error::{Error, Result};
use crate::types::{Frame, CHANNELS};
use ndarray::Array4;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Declared tensor shape; `None` marks a dynamic axis
pub type TensorShape = Vec<Option<u32>>;

/// A loaded super-resolution model
pub trait SuperResolutionModel: Send {
    /// Declared input shape, NHWC
    fn input_shape(&self) -> TensorShape;

    /// Declared output shape, NHWC
    fn output_shape(&self) -> TensorShape;

    /// Run one batch
    fn run(&mut self, input: Array4<f32>) -> Result<Array4<f32>>;
}

/// Turns a model path into a runnable model
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn SuperResolutionModel>>;
}

/// Check the NHWC contract: both tensors rank 4, three channels when declared
pub fn validate_shapes(input: &[Option<u32>], output: &[Option<u32>]) -> Result<()> {
    for (which, shape) in [("input", input), ("output", output)] {
        if shape.len() != 4 {
            return Err(Error::ModelLoad(format!(
                "{} tensor has rank {}, expected 4 (batch, height, width, channels)",
                which,
                shape.len()
            )));
        }
        if let Some(channels) = shape[3] {
            if channels as usize != CHANNELS {
                return Err(Error::ModelLoad(format!(
                    "{} tensor has {} channels, expected {}",
                    which, channels, CHANNELS
                )));
            }
        }
    }
    Ok(())
}

/// Infer the native scale from declared shapes.
///
/// Known only when both heights are static, the output height is an integer
/// multiple of the input height, and the ratio exceeds 1. If both widths are
/// static too they must agree with the height ratio; a non-square scale is
/// rejected.
pub fn infer_native_scale(input: &[Option<u32>], output: &[Option<u32>]) -> Result<Option<u32>> {
    let axis_ratio = |axis: usize| -> Option<u32> {
        match (input.get(axis).copied().flatten(), output.get(axis).copied().flatten()) {
            (Some(i), Some(o)) if i > 0 && o > i && o % i == 0 => Some(o / i),
            _ => None,
        }
    };

    let Some(scale) = axis_ratio(1) else {
        return Ok(None);
    };

    let widths_static = matches!(
        (input.get(2).copied().flatten(), output.get(2).copied().flatten()),
        (Some(_), Some(_))
    );
    if widths_static && axis_ratio(2) != Some(scale) {
        return Err(Error::ModelLoad(format!(
            "non-square scale: height scales by {} but width shape is {:?} -> {:?}",
            scale,
            input.get(2).copied().flatten(),
            output.get(2).copied().flatten()
        )));
    }
    Ok(Some(scale))
}

/// Frame to a `[1, H, W, 3]` batch in `[0, 1]`
pub fn normalize(frame: &Frame) -> Result<Array4<f32>> {
    if !frame.is_well_formed() {
        return Err(Error::FrameTransform(format!(
            "pixel buffer is {} bytes, expected {}",
            frame.data.len(),
            Frame::expected_len(frame.width, frame.height)
        )));
    }
    let data: Vec<f32> = frame.data.iter().map(|&v| v as f32 / 255.0).collect();
    Array4::from_shape_vec(
        (1, frame.height as usize, frame.width as usize, CHANNELS),
        data,
    )
    .map_err(|e| Error::FrameTransform(e.to_string()))
}

/// `[1, H, W, 3]` batch back to an 8-bit frame, clipping to `[0, 1]`
pub fn denormalize(output: &Array4<f32>, pts: i64) -> Result<Frame> {
    let (batch, height, width, channels) = output.dim();
    if batch < 1 || channels != CHANNELS || height == 0 || width == 0 {
        return Err(Error::FrameTransform(format!(
            "model returned shape {:?}",
            output.shape()
        )));
    }

    let data: Vec<u8> = output
        .index_axis(ndarray::Axis(0), 0)
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    Ok(Frame::from_rgb(data, width as u32, height as u32).with_pts(pts))
}

/// A loaded model, ready for per-frame inference
pub struct SrModelHandle {
    path: PathBuf,
    native_scale: Option<u32>,
    timeout: Duration,
    worker: Mutex<InferenceWorker>,
    mismatch_reported: AtomicBool,
}

impl SrModelHandle {
    /// Check the model's shapes, infer its native scale and start its
    /// inference thread
    pub fn new(
        path: impl Into<PathBuf>,
        model: Box<dyn SuperResolutionModel>,
        timeout: Duration,
    ) -> Result<Self> {
        let path = path.into();
        let (input, output) = (model.input_shape(), model.output_shape());
        validate_shapes(&input, &output)?;
        let native_scale = infer_native_scale(&input, &output)?;

        match native_scale {
            Some(scale) => tracing::info!(
                "Loaded model {} (native scale {}x)",
                path.display(),
                scale
            ),
            None => tracing::info!(
                "Loaded model {} (native scale unknown, input {:?}, output {:?})",
                path.display(),
                input,
                output
            ),
        }

        let worker = InferenceWorker::spawn(model)?;
        Ok(Self {
            path,
            native_scale,
            timeout,
            worker: Mutex::new(worker),
            mismatch_reported: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn native_scale(&self) -> Option<u32> {
        self.native_scale
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upscale one frame at the model's native scale.
    ///
    /// `requested_scale` is only compared against the native scale for a
    /// diagnostic; reconciling to the requested size is the caller's job.
    pub fn infer(&self, frame: &Frame, requested_scale: f64) -> Result<Frame> {
        if let Some(native) = self.native_scale {
            if (native as f64 - requested_scale).abs() > 1e-6
                && !self.mismatch_reported.swap(true, Ordering::Relaxed)
            {
                tracing::warn!(
                    "Model {} upscales {}x but {}x was requested; output will be resized",
                    self.path.display(),
                    native,
                    requested_scale
                );
            }
        }

        let input = normalize(frame)?;
        let output = self.worker.lock().run(input, self.timeout)?;

        let (_, out_h, out_w, _) = output.dim();
        let (in_h, in_w) = (frame.height as usize, frame.width as usize);
        if out_h == 0 || out_w == 0 {
            return Err(Error::FrameTransform(format!(
                "model returned an empty image {:?}",
                output.shape()
            )));
        }
        // out_h / in_h == out_w / in_w without floating point
        if out_h * in_w != out_w * in_h {
            return Err(Error::FrameTransform(format!(
                "non-square model output: {}x{} -> {}x{}",
                in_w, in_h, out_w, out_h
            )));
        }

        denormalize(&output, frame.pts)
    }
}

impl std::fmt::Debug for SrModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrModelHandle")
            .field("path", &self.path)
            .field("native_scale", &self.native_scale)
            .field("timeout", &self.timeout)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RepeatModel;
    use super::*;

    fn dims(v: &[i64]) -> TensorShape {
        v.iter().map(|&d| u32::try_from(d).ok()).collect()
    }

    #[test]
    fn test_native_scale_from_static_shapes() {
        let input = dims(&[1, 64, 64, 3]);
        let output = dims(&[1, 256, 256, 3]);
        assert_eq!(infer_native_scale(&input, &output).unwrap(), Some(4));
    }

    #[test]
    fn test_native_scale_unknown_for_dynamic_or_non_integer() {
        let dynamic = dims(&[1, -1, -1, 3]);
        assert_eq!(infer_native_scale(&dynamic, &dynamic).unwrap(), None);

        let input = dims(&[1, 64, 64, 3]);
        assert_eq!(
            infer_native_scale(&input, &dims(&[1, 96, 96, 3])).unwrap(),
            None
        );
        assert_eq!(infer_native_scale(&input, &input).unwrap(), None);
        assert_eq!(
            infer_native_scale(&input, &dims(&[1, 32, 32, 3])).unwrap(),
            None
        );
    }

    #[test]
    fn test_native_scale_rejects_non_square() {
        let input = dims(&[1, 64, 64, 3]);
        let output = dims(&[1, 128, 256, 3]);
        assert!(matches!(
            infer_native_scale(&input, &output),
            Err(Error::ModelLoad(_))
        ));
    }

    #[test]
    fn test_native_scale_with_dynamic_width_uses_height() {
        let input = dims(&[1, 64, -1, 3]);
        let output = dims(&[1, 128, -1, 3]);
        assert_eq!(infer_native_scale(&input, &output).unwrap(), Some(2));
    }

    #[test]
    fn test_validate_shapes() {
        let good = dims(&[1, -1, -1, 3]);
        assert!(validate_shapes(&good, &good).is_ok());
        assert!(validate_shapes(&dims(&[1, 3, 64]), &good).is_err());
        assert!(validate_shapes(&good, &dims(&[1, 64, 64, 1])).is_err());
    }

    #[test]
    fn test_normalize_and_denormalize() {
        let frame = Frame::from_rgb(vec![0, 51, 255, 255, 102, 0], 2, 1).with_pts(9);
        let batch = normalize(&frame).unwrap();
        assert_eq!(batch.dim(), (1, 1, 2, 3));
        assert_eq!(batch[[0, 0, 0, 2]], 1.0);
        assert!((batch[[0, 0, 0, 1]] - 0.2).abs() < 1e-6);

        let back = denormalize(&batch, frame.pts).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_denormalize_clips() {
        let out = Array4::from_shape_vec((1, 1, 1, 3), vec![-0.5, 0.5, 7.0]).unwrap();
        let frame = denormalize(&out, 0).unwrap();
        assert_eq!(frame.data, vec![0, 128, 255]);
    }

    #[test]
    fn test_handle_infers_at_native_scale() {
        let handle = SrModelHandle::new(
            "repeat.onnx",
            Box::new(RepeatModel::fixed(2, 4, 6)),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(handle.native_scale(), Some(2));

        let frame = Frame::from_rgb(vec![200; 4 * 6 * 3], 6, 4).with_pts(3);
        // requested 3x only produces a diagnostic
        let out = handle.infer(&frame, 3.0).unwrap();
        assert_eq!(out.resolution(), crate::types::Resolution::new(12, 8));
        assert_eq!(out.pts, 3);
        assert!(out.data.iter().all(|&v| v == 200));
    }

    #[test]
    fn test_handle_rejects_bad_shapes() {
        let mut model = RepeatModel::dynamic(2);
        model.output_shape = vec![Some(1), None, None];
        let err = SrModelHandle::new("bad.onnx", Box::new(model), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn test_inference_timeout_is_a_frame_error() {
        let mut model = RepeatModel::dynamic(2);
        model.delay = Some(Duration::from_millis(500));
        let handle =
            SrModelHandle::new("slow.onnx", Box::new(model), Duration::from_millis(20)).unwrap();

        let err = handle.infer(&Frame::new(2, 2), 2.0).unwrap_err();
        assert!(err.is_recoverable());
    }
}
