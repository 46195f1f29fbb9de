//! Common types used throughout UpscaleFx

use serde::{Deserialize, Serialize};

/// Frame rate substituted when a source reports an implausible value
pub const DEFAULT_FPS: f64 = 25.0;

/// Highest frame rate accepted from a source as trustworthy
pub const MAX_PLAUSIBLE_FPS: f64 = 240.0;

/// Bytes per pixel of a packed RGB24 frame
pub const CHANNELS: usize = 3;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    // Common resolutions
    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);
    pub const UHD_4K: Self = Self::new(3840, 2160);

    /// Calculate total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Calculate aspect ratio
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// True if either axis is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Multiply both axes by `factor`, flooring each independently.
    ///
    /// Returns `None` when the factor is not a positive finite number or the
    /// result would not fit in a `u32`.
    pub fn scaled(&self, factor: f64) -> Option<Resolution> {
        if !factor.is_finite() || factor <= 0.0 {
            return None;
        }
        let w = (self.width as f64 * factor).floor();
        let h = (self.height as f64 * factor).floor();
        if w > u32::MAX as f64 || h > u32::MAX as f64 {
            return None;
        }
        Some(Resolution::new(w as u32, h as u32))
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded video frame in packed RGB24 layout (height x width x 3)
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Tightly packed pixel data, row-major
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Presentation index assigned by the source
    pub pts: i64,
}

impl Frame {
    /// Create a black frame
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0u8; Self::expected_len(width, height)],
            width,
            height,
            pts: 0,
        }
    }

    /// Create a frame from packed RGB24 data
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            pts: 0,
        }
    }

    /// Builder-style pts assignment
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    /// Byte length of a packed RGB24 buffer for the given dimensions
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    /// Get resolution
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Buffer length matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == Self::expected_len(self.width, self.height)
    }

    /// Calculate frame size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Four-character codec tag, e.g. `avc1` or `XVID`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FourCc(String);

impl FourCc {
    /// Decode a little-endian packed tag. Decoding stops at the first zero byte.
    pub fn from_u32(tag: u32) -> Self {
        let text: String = tag
            .to_le_bytes()
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        Self(text.trim().to_string())
    }

    pub fn from_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Pack the first four bytes little-endian, space padded
    pub fn to_u32(&self) -> u32 {
        let mut bytes = [b' '; 4];
        for (slot, b) in bytes.iter_mut().zip(self.0.bytes()) {
            *slot = b;
        }
        u32::from_le_bytes(bytes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "(none)")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Properties reported by an open source
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProperties {
    pub resolution: Resolution,
    /// Frame rate as reported by the container, possibly implausible
    pub fps: f64,
    pub codec_tag: FourCc,
    /// Frame count if the container declares one
    pub frame_count: Option<u64>,
}

impl VideoProperties {
    /// Frame rate with implausible values replaced by `default`
    pub fn effective_fps(&self, default: f64) -> f64 {
        sanitize_fps(self.fps, default)
    }
}

/// Replace a frame rate outside (0, 240] with `default`
pub fn sanitize_fps(fps: f64, default: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 && fps <= MAX_PLAUSIBLE_FPS {
        fps
    } else {
        default
    }
}
