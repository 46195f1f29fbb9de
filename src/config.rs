//! Configuration types for UpscaleFx

use crate::encode::Codec;
use crate::error::{Error, Result};
use crate::processing::Kernel;
use crate::types::{Resolution, DEFAULT_FPS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How the output size is derived from the source size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleRequest {
    /// Multiply both axes by the same factor
    Factor(f64),
    /// Exact output dimensions
    Dimensions { width: u32, height: u32 },
    /// Scale to a width, keeping aspect ratio with an even height.
    /// Never shrinks: a width below the source width keeps the source size.
    FitWidth { width: u32 },
}

impl ScaleRequest {
    /// Build a request from the two mutually exclusive forms
    pub fn from_parts(factor: Option<f64>, dimensions: Option<Resolution>) -> Result<Self> {
        let request = match (factor, dimensions) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidParameter(
                    "give either a scale factor or target dimensions, not both".into(),
                ))
            }
            (None, None) => {
                return Err(Error::InvalidParameter(
                    "a scale factor or target dimensions is required".into(),
                ))
            }
            (Some(f), None) => ScaleRequest::Factor(f),
            (None, Some(res)) => ScaleRequest::Dimensions {
                width: res.width,
                height: res.height,
            },
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the request on its own, before any source is known
    pub fn validate(&self) -> Result<()> {
        match *self {
            ScaleRequest::Factor(f) if !f.is_finite() || f <= 0.0 => Err(
                Error::InvalidParameter(format!("scale factor must be positive, got {}", f)),
            ),
            ScaleRequest::Dimensions { width, height } if width == 0 || height == 0 => {
                Err(Error::InvalidParameter(format!(
                    "target dimensions must be positive, got {}x{}",
                    width, height
                )))
            }
            ScaleRequest::FitWidth { width: 0 } => Err(Error::InvalidParameter(
                "target width must be positive".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Output dimensions for a given source size
    pub fn target_for(&self, source: Resolution) -> Result<Resolution> {
        self.validate()?;
        if source.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "source has a zero dimension ({})",
                source
            )));
        }

        let target = match *self {
            ScaleRequest::Factor(f) => source.scaled(f).ok_or_else(|| {
                Error::InvalidParameter(format!("scale factor {} overflows {}", f, source))
            })?,
            ScaleRequest::Dimensions { width, height } => Resolution::new(width, height),
            ScaleRequest::FitWidth { width } if width < source.width => {
                tracing::info!(
                    "Target width {} is below source width {}, keeping {}",
                    width,
                    source.width,
                    source
                );
                source
            }
            ScaleRequest::FitWidth { width } => {
                let exact = source.height as f64 * width as f64 / source.width as f64;
                let height = ((exact / 2.0).round() * 2.0).max(2.0) as u32;
                Resolution::new(width, height)
            }
        };

        if target.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "target dimensions {} are not positive",
                target
            )));
        }
        Ok(target)
    }

    /// The horizontal factor this request amounts to for a source size
    pub fn nominal_factor(&self, source: Resolution) -> f64 {
        match *self {
            ScaleRequest::Factor(f) => f,
            _ => match self.target_for(source) {
                Ok(target) if source.width > 0 => target.width as f64 / source.width as f64,
                _ => 1.0,
            },
        }
    }
}

impl Default for ScaleRequest {
    fn default() -> Self {
        ScaleRequest::Factor(2.0)
    }
}

impl FromStr for ScaleRequest {
    type Err = Error;

    /// Parse `2x`, `1.5x`, `1080p`, `4k` or `WIDTHxHEIGHT`
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let request = match lower.as_str() {
            "1080p" => ScaleRequest::FitWidth {
                width: Resolution::FHD_1080P.width,
            },
            "4k" | "2160p" => ScaleRequest::FitWidth {
                width: Resolution::UHD_4K.width,
            },
            "720p" => ScaleRequest::FitWidth {
                width: Resolution::HD_720P.width,
            },
            other => {
                if let Some(factor) = other.strip_suffix('x') {
                    let factor: f64 = factor.parse().map_err(|_| {
                        Error::InvalidParameter(format!("invalid scale factor '{}'", s))
                    })?;
                    ScaleRequest::Factor(factor)
                } else {
                    let dims = parse_dimensions(other)?;
                    ScaleRequest::Dimensions {
                        width: dims.width,
                        height: dims.height,
                    }
                }
            }
        };
        request.validate()?;
        Ok(request)
    }
}

/// Parse `WIDTHxHEIGHT`
pub fn parse_dimensions(s: &str) -> Result<Resolution> {
    let parts: Vec<&str> = s.trim().split(['x', 'X']).collect();
    if parts.len() == 2 {
        if let (Ok(w), Ok(h)) = (parts[0].parse(), parts[1].parse()) {
            return Ok(Resolution::new(w, h));
        }
    }
    Err(Error::InvalidParameter(format!(
        "invalid size '{}', expected WIDTHxHEIGHT or a scale option like 2x, 1080p, 4k",
        s
    )))
}

/// Named scale options
pub const SCALE_PRESETS: [(&str, &str); 5] = [
    ("2x", "double width and height"),
    ("4x", "quadruple width and height"),
    ("720p", "fit width 1280, keep aspect ratio"),
    ("1080p", "fit width 1920, keep aspect ratio"),
    ("4k", "fit width 3840, keep aspect ratio"),
];

/// Upscale run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleConfig {
    /// Source video
    pub input: PathBuf,
    /// Output video; the extension selects the container
    pub output: PathBuf,
    /// Output size
    pub scale: ScaleRequest,
    /// Kernel for classical resampling
    pub kernel: Kernel,
    /// Learned super-resolution model (ONNX)
    pub model_path: Option<PathBuf>,
    /// Preferred output codec, overriding the container default
    pub codec: Option<Codec>,
    /// Deadline for one model inference call
    pub inference_timeout_secs: u64,
    /// Read/write timeout handed to the demuxer, for protocols that honor it
    pub io_timeout_secs: Option<u64>,
    /// Frame rate used when the source reports an implausible one
    pub default_fps: f64,
    /// Log progress every N written frames (0 disables)
    pub progress_interval: u64,
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            scale: ScaleRequest::default(),
            kernel: Kernel::default(),
            model_path: None,
            codec: None,
            inference_timeout_secs: 30,
            io_timeout_secs: None,
            default_fps: DEFAULT_FPS,
            progress_interval: 50,
        }
    }
}

impl UpscaleConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: ScaleRequest) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_scale_factor(mut self, factor: f64) -> Self {
        self.scale = ScaleRequest::Factor(factor);
        self
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_progress_interval(mut self, frames: u64) -> Self {
        self.progress_interval = frames;
        self
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs.map(Duration::from_secs)
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Pre-flight checks, run before any resource is opened
    pub fn validate(&self) -> Result<()> {
        if self.input.as_os_str().is_empty() {
            return Err(Error::InvalidParameter("input path is required".into()));
        }
        if !self.input.is_file() {
            return Err(Error::NotFound(self.input.clone()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::InvalidParameter("output path is required".into()));
        }
        if self.output == self.input {
            return Err(Error::InvalidParameter(
                "output path must differ from input path".into(),
            ));
        }
        self.scale.validate()?;

        if let Some(model) = &self.model_path {
            if !model.exists() {
                return Err(Error::ModelLoad(format!(
                    "model not found: {}",
                    model.display()
                )));
            }
        }
        if self.inference_timeout_secs == 0 {
            return Err(Error::InvalidParameter(
                "inference timeout must be at least one second".into(),
            ));
        }
        if !(self.default_fps.is_finite() && self.default_fps > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "default fps must be positive, got {}",
                self.default_fps
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scale_options() {
        assert_eq!("2x".parse::<ScaleRequest>().unwrap(), ScaleRequest::Factor(2.0));
        assert_eq!("1.5X".parse::<ScaleRequest>().unwrap(), ScaleRequest::Factor(1.5));
        assert_eq!(
            "1080p".parse::<ScaleRequest>().unwrap(),
            ScaleRequest::FitWidth { width: 1920 }
        );
        assert_eq!(
            "4K".parse::<ScaleRequest>().unwrap(),
            ScaleRequest::FitWidth { width: 3840 }
        );
        assert_eq!(
            "1280x720".parse::<ScaleRequest>().unwrap(),
            ScaleRequest::Dimensions {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_options() {
        for bad in ["0x", "-2x", "abcx", "8k", "x720", "0x720", ""] {
            let err = bad.parse::<ScaleRequest>().unwrap_err();
            assert!(matches!(err, Error::InvalidParameter(_)), "{}", bad);
        }
    }

    #[test]
    fn test_from_parts_requires_exactly_one_form() {
        assert!(ScaleRequest::from_parts(None, None).is_err());
        assert!(ScaleRequest::from_parts(Some(2.0), Some(Resolution::new(10, 10))).is_err());
        assert_eq!(
            ScaleRequest::from_parts(Some(3.0), None).unwrap(),
            ScaleRequest::Factor(3.0)
        );
        assert!(ScaleRequest::from_parts(Some(0.0), None).is_err());
        assert!(ScaleRequest::from_parts(None, Some(Resolution::new(0, 10))).is_err());
    }

    #[test]
    fn test_target_for_factor_floors() {
        let target = ScaleRequest::Factor(1.5).target_for(Resolution::new(333, 201)).unwrap();
        assert_eq!(target, Resolution::new(499, 301));
    }

    #[test]
    fn test_target_for_factor_collapsing_to_zero_is_invalid() {
        let err = ScaleRequest::Factor(0.1).target_for(Resolution::new(5, 5)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[test]
    fn test_fit_width_keeps_aspect_with_even_height() {
        let request = ScaleRequest::FitWidth { width: 1920 };
        assert_eq!(
            request.target_for(Resolution::new(640, 360)).unwrap(),
            Resolution::new(1920, 1080)
        );
        // 1920 * 241 / 640 = 722.8 -> 722
        assert_eq!(
            request.target_for(Resolution::new(640, 241)).unwrap(),
            Resolution::new(1920, 722)
        );
    }

    #[test]
    fn test_fit_width_never_shrinks() {
        let request = ScaleRequest::FitWidth { width: 1280 };
        let source = Resolution::new(1920, 1080);
        assert_eq!(request.target_for(source).unwrap(), source);
    }

    #[test]
    fn test_nominal_factor() {
        let source = Resolution::new(640, 360);
        assert_eq!(ScaleRequest::Factor(4.0).nominal_factor(source), 4.0);
        assert_eq!(
            ScaleRequest::Dimensions {
                width: 1280,
                height: 720
            }
            .nominal_factor(source),
            2.0
        );
    }

    #[test]
    fn test_validate_missing_input_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = UpscaleConfig::new(dir.path().join("nope.mp4"), dir.path().join("out.mp4"));
        assert!(matches!(config.validate(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_validate_missing_model_is_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"not really a video").unwrap();
        let config = UpscaleConfig::new(&input, dir.path().join("out.mp4"))
            .with_model(dir.path().join("model.onnx"));
        assert!(matches!(config.validate(), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn test_validate_rejects_bad_scale() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.mp4");
        std::fs::write(&input, b"x").unwrap();
        let config = UpscaleConfig::new(&input, dir.path().join("out.mp4")).with_scale_factor(-1.0);
        assert!(matches!(config.validate(), Err(Error::InvalidParameter(_))));

        let same = UpscaleConfig::new(&input, &input);
        assert!(matches!(same.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_toml_config() {
        let config = UpscaleConfig::from_toml_str(
            r#"
            input = "clip.mp4"
            output = "clip_2x.avi"
            kernel = "lanczos4"
            codec = "xvid"
            inference_timeout_secs = 5

            [scale]
            factor = 2.5
            "#,
        )
        .unwrap();

        assert_eq!(config.input, PathBuf::from("clip.mp4"));
        assert_eq!(config.scale, ScaleRequest::Factor(2.5));
        assert_eq!(config.kernel, Kernel::Lanczos);
        assert_eq!(config.codec, Some(Codec::Xvid));
        assert_eq!(config.inference_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_fps, DEFAULT_FPS);
        assert_eq!(config.progress_interval, 50);
    }

    #[test]
    fn test_toml_unknown_kernel_falls_back_to_cubic() {
        let config = UpscaleConfig::from_toml_str("kernel = \"sinc\"").unwrap();
        assert_eq!(config.kernel, Kernel::Cubic);
    }

    #[test]
    fn test_toml_dimensions() {
        let config = UpscaleConfig::from_toml_str(
            "[scale.dimensions]\nwidth = 1280\nheight = 720\n",
        )
        .unwrap();
        assert_eq!(
            config.scale,
            ScaleRequest::Dimensions {
                width: 1280,
                height: 720
            }
        );
    }
}
