//! End-to-end runs through the public API

use ndarray::Array4;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use upscalefx::input::{open_source, SourceOptions, SyntheticSource};
use upscalefx::output::{staging_path, FileSinkFactory, MemorySinkFactory};
use upscalefx::sr::{ModelCache, ModelLoader, SuperResolutionModel, TensorShape};
use upscalefx::types::{Frame, VideoProperties};
use upscalefx::{
    CancelToken, Error, FrameSource, Kernel, Pipeline, Resolution, RunStatus, ScaleRequest,
    SinkFactory, SinkSpec, UpscaleConfig,
};

/// Nearest-neighbour "model" with a fixed native scale
struct Repeat(usize);

impl SuperResolutionModel for Repeat {
    fn input_shape(&self) -> TensorShape {
        vec![Some(1), None, None, Some(3)]
    }

    fn output_shape(&self) -> TensorShape {
        vec![Some(1), None, None, Some(3)]
    }

    fn run(&mut self, input: Array4<f32>) -> upscalefx::Result<Array4<f32>> {
        let (n, h, w, c) = input.dim();
        let s = self.0;
        Ok(Array4::from_shape_fn((n, h * s, w * s, c), |(b, y, x, ch)| {
            input[[b, y / s, x / s, ch]]
        }))
    }
}

#[derive(Clone, Default)]
struct CountingLoader {
    scale: usize,
    loads: Arc<AtomicU64>,
}

impl ModelLoader for CountingLoader {
    fn load(&self, _path: &Path) -> upscalefx::Result<Box<dyn SuperResolutionModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Repeat(self.scale)))
    }
}

struct FailingLoader;

impl ModelLoader for FailingLoader {
    fn load(&self, path: &Path) -> upscalefx::Result<Box<dyn SuperResolutionModel>> {
        Err(Error::ModelLoad(format!("{}: not an ONNX graph", path.display())))
    }
}

/// Synthetic source that corrupts the listed frames
struct Corrupting {
    inner: SyntheticSource,
    broken: Vec<i64>,
}

impl FrameSource for Corrupting {
    fn properties(&self) -> &VideoProperties {
        self.inner.properties()
    }

    fn read_frame(&mut self) -> upscalefx::Result<Option<Frame>> {
        let frame = self.inner.read_frame()?;
        Ok(frame.map(|mut f| {
            if self.broken.contains(&f.pts) {
                f.data.clear();
            }
            f
        }))
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

fn synthetic(width: u32, height: u32, frames: u64) -> Box<dyn FrameSource> {
    Box::new(SyntheticSource::new(Resolution::new(width, height), frames, 25.0))
}

#[test]
fn test_classical_2x_cubic() {
    let sinks = MemorySinkFactory::new();
    let config = UpscaleConfig::new("in.mp4", "out.mp4")
        .with_scale_factor(2.0)
        .with_kernel(Kernel::Cubic);

    let report = Pipeline::new(config)
        .run_with(synthetic(32, 24, 10), &sinks, &CancelToken::new())
        .unwrap();

    assert_eq!(report.status, RunStatus::Complete);
    assert_eq!(report.frames_read, 10);
    assert_eq!(report.frames_written, 10);
    let frames = sinks.frames();
    assert_eq!(frames.len(), 10);
    assert!(frames.iter().all(|f| f.resolution() == Resolution::new(64, 48)));
    let pts: Vec<i64> = frames.iter().map(|f| f.pts).collect();
    assert_eq!(pts, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("source.mp4");
    let output = dir.path().join("nested").join("upscaled.mp4");

    // Write a small source clip
    let mut sink = FileSinkFactory
        .open(&SinkSpec {
            path: input.clone(),
            resolution: Resolution::new(32, 24),
            fps: 25.0,
            preferred_codec: None,
        })
        .unwrap();
    let mut source = SyntheticSource::new(Resolution::new(32, 24), 10, 25.0);
    while let Some(frame) = source.read_frame().unwrap() {
        assert!(sink.write_frame(&frame).unwrap());
    }
    sink.close().unwrap();
    drop(sink);

    let config = UpscaleConfig::new(&input, &output).with_scale_factor(2.0);
    let report = Pipeline::new(config).run(&CancelToken::new()).unwrap();
    assert_eq!(report.frames_written, 10);
    assert_eq!(report.target_resolution, Resolution::new(64, 48));

    let mut check = open_source(&output, &SourceOptions::default()).unwrap();
    assert_eq!(check.properties().resolution, Resolution::new(64, 48));
    let mut decoded = 0;
    while let Some(frame) = check.read_frame().unwrap() {
        assert_eq!(frame.resolution(), Resolution::new(64, 48));
        decoded += 1;
    }
    check.close();
    assert_eq!(decoded, 10);
    assert!(!staging_path(&output).exists());
}

#[test]
fn test_missing_input_creates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    let config = UpscaleConfig::new(dir.path().join("missing.mp4"), &output);

    let err = Pipeline::new(config).run(&CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(!output.exists());
}

#[test]
fn test_corrupt_frames_make_partial_run() {
    let sinks = MemorySinkFactory::new();
    let source = Corrupting {
        inner: SyntheticSource::new(Resolution::new(16, 16), 10, 25.0),
        broken: vec![3, 7],
    };

    let report = Pipeline::new(UpscaleConfig::new("in.mp4", "out.mp4"))
        .run_with(Box::new(source), &sinks, &CancelToken::new())
        .unwrap();

    assert_eq!(report.frames_read, 10);
    assert_eq!(report.frames_written, 8);
    assert_eq!(report.status, RunStatus::Partial);
    assert!(sinks.frames().iter().all(|f| f.pts != 3 && f.pts != 7));
}

#[test]
fn test_empty_source_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("empty.avi");
    let config = UpscaleConfig::new("in.mp4", &output);

    let err = Pipeline::new(config)
        .run_with(synthetic(16, 16, 0), &FileSinkFactory, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::EmptyResult { frames_read: 0, .. }));
    assert!(!output.exists());
    assert!(!staging_path(&output).exists());
}

#[test]
fn test_empty_source_keeps_previous_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("previous.mp4");
    std::fs::write(&output, b"yesterday's render").unwrap();
    let config = UpscaleConfig::new("in.mp4", &output);

    let err = Pipeline::new(config)
        .run_with(synthetic(16, 16, 0), &FileSinkFactory, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::EmptyResult { .. }));
    assert_eq!(std::fs::read(&output).unwrap(), b"yesterday's render");
    assert!(!staging_path(&output).exists());
}

#[test]
fn test_model_loaded_once_per_cache() {
    let loader = CountingLoader {
        scale: 2,
        ..Default::default()
    };
    let cache = ModelCache::new(Arc::new(loader.clone()), Duration::from_secs(5)).into_shared();
    let config = UpscaleConfig::new("in.mp4", "out.mp4").with_model("x2.onnx");

    for _ in 0..3 {
        let pipeline = Pipeline::new(config.clone()).with_model_cache(cache.clone());
        pipeline
            .run_with(synthetic(8, 8, 2), &MemorySinkFactory::new(), &CancelToken::new())
            .unwrap();
    }

    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(cache.lock().load_count(), 1);
}

#[test]
fn test_native_scale_mismatch_hits_target() {
    let loader = CountingLoader {
        scale: 4,
        ..Default::default()
    };
    let cache = ModelCache::new(Arc::new(loader), Duration::from_secs(5)).into_shared();
    let config = UpscaleConfig::new("in.mp4", "out.mp4")
        .with_model("x4.onnx")
        .with_scale(ScaleRequest::Dimensions {
            width: 30,
            height: 20,
        });

    let sinks = MemorySinkFactory::new();
    let report = Pipeline::new(config)
        .with_model_cache(cache)
        .run_with(synthetic(12, 8, 3), &sinks, &CancelToken::new())
        .unwrap();

    assert_eq!(report.status, RunStatus::Complete);
    assert!(sinks
        .frames()
        .iter()
        .all(|f| f.resolution() == Resolution::new(30, 20)));
}

#[test]
fn test_model_load_failure_is_fatal() {
    let cache = ModelCache::new(Arc::new(FailingLoader), Duration::from_secs(1)).into_shared();
    let config = UpscaleConfig::new("in.mp4", "out.mp4").with_model("broken.onnx");
    let sinks = MemorySinkFactory::new();

    let err = Pipeline::new(config)
        .with_model_cache(cache.clone())
        .run_with(synthetic(8, 8, 4), &sinks, &CancelToken::new())
        .unwrap_err();

    assert!(matches!(err, Error::ModelLoad(_)));
    assert!(sinks.frames().is_empty());

    // The failure is remembered; a second run does not retry
    let again = Pipeline::new(UpscaleConfig::new("in.mp4", "out.mp4").with_model("broken.onnx"))
        .with_model_cache(cache.clone())
        .run_with(synthetic(8, 8, 1), &sinks, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(again, Error::ModelLoad(_)));
    assert_eq!(cache.lock().load_count(), 1);
}

#[test]
fn test_cancel_mid_run() {
    struct CancelAfter {
        inner: SyntheticSource,
        token: CancelToken,
        after: i64,
        seen: Arc<Mutex<u64>>,
    }

    impl FrameSource for CancelAfter {
        fn properties(&self) -> &VideoProperties {
            self.inner.properties()
        }

        fn read_frame(&mut self) -> upscalefx::Result<Option<Frame>> {
            let frame = self.inner.read_frame()?;
            if let Some(f) = &frame {
                *self.seen.lock() += 1;
                if f.pts == self.after {
                    self.token.cancel();
                }
            }
            Ok(frame)
        }

        fn close(&mut self) {
            self.inner.close();
        }

        fn is_open(&self) -> bool {
            self.inner.is_open()
        }
    }

    let token = CancelToken::new();
    let seen = Arc::new(Mutex::new(0));
    let source = CancelAfter {
        inner: SyntheticSource::new(Resolution::new(8, 8), 20, 25.0),
        token: token.clone(),
        after: 4,
        seen: seen.clone(),
    };

    let err = Pipeline::new(UpscaleConfig::new("in.mp4", "out.mp4"))
        .run_with(Box::new(source), &MemorySinkFactory::new(), &token)
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Cancelled {
            frames_read: 5,
            frames_written: 5
        }
    ));
    assert_eq!(*seen.lock(), 5);
}
