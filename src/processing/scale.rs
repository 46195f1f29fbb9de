//! Frame resampling

use crate::error::{Error, Result};
use crate::types::{Frame, Resolution};

use fast_image_resize as fr;
use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use serde::{Deserialize, Serialize};

/// Interpolation kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Kernel {
    /// Nearest neighbor (fastest, pixelated)
    Nearest,
    /// Bilinear
    Linear,
    /// Bicubic (Catmull-Rom)
    #[default]
    Cubic,
    /// Box filter, area averaging when shrinking
    Area,
    /// Lanczos, 3 lobes (the widest fast_image_resize offers)
    Lanczos,
}

impl Kernel {
    pub const ALL: [Kernel; 5] = [
        Kernel::Nearest,
        Kernel::Linear,
        Kernel::Cubic,
        Kernel::Area,
        Kernel::Lanczos,
    ];

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Nearest => "nearest",
            Kernel::Linear => "linear",
            Kernel::Cubic => "cubic",
            Kernel::Area => "area",
            Kernel::Lanczos => "lanczos",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Kernel::Nearest => "nearest neighbor, blocky but exact colors",
            Kernel::Linear => "bilinear, fast and smooth",
            Kernel::Cubic => "bicubic, balanced (default)",
            Kernel::Area => "box/area averaging, best for shrinking",
            Kernel::Lanczos => "3-lobe lanczos, sharpest and slowest",
        }
    }

    /// Strict lookup by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Kernel> {
        match name.trim().to_lowercase().as_str() {
            "nearest" => Some(Kernel::Nearest),
            "linear" | "bilinear" => Some(Kernel::Linear),
            "cubic" | "bicubic" => Some(Kernel::Cubic),
            "area" | "box" => Some(Kernel::Area),
            "lanczos" | "lanczos3" | "lanczos4" | "high-order" => Some(Kernel::Lanczos),
            _ => None,
        }
    }

    /// Lookup by name, falling back to cubic for unknown names
    pub fn parse_lenient(name: &str) -> Kernel {
        Kernel::from_name(name).unwrap_or_else(|| {
            tracing::warn!("Unknown interpolation kernel '{}', using cubic", name);
            Kernel::Cubic
        })
    }

    fn resize_alg(&self) -> ResizeAlg {
        match self {
            Kernel::Nearest => ResizeAlg::Nearest,
            Kernel::Linear => ResizeAlg::Convolution(FilterType::Bilinear),
            Kernel::Cubic => ResizeAlg::Convolution(FilterType::CatmullRom),
            Kernel::Area => ResizeAlg::Convolution(FilterType::Box),
            Kernel::Lanczos => ResizeAlg::Convolution(FilterType::Lanczos3),
        }
    }
}

impl From<String> for Kernel {
    fn from(name: String) -> Self {
        Kernel::parse_lenient(&name)
    }
}

impl From<Kernel> for String {
    fn from(kernel: Kernel) -> Self {
        kernel.name().to_string()
    }
}

impl std::fmt::Display for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Requested output size of a resize
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResizeTarget {
    /// Multiply both axes, flooring each
    Factor(f64),
    /// Exact output dimensions
    Exact(Resolution),
}

/// Resize a frame.
///
/// Degenerate requests (a zero-sized source, a non-positive factor, or a
/// computed size with a zero axis) return the input unchanged and log a
/// warning. Only a malformed pixel buffer or a resampler failure is an error.
pub fn resize(frame: &Frame, target: ResizeTarget, kernel: Kernel) -> Result<Frame> {
    let src_res = frame.resolution();
    if src_res.is_empty() {
        tracing::warn!("Frame has a zero dimension ({}), returning it unchanged", src_res);
        return Ok(frame.clone());
    }

    let dst_res = match target {
        ResizeTarget::Factor(factor) => match src_res.scaled(factor) {
            Some(res) => res,
            None => {
                tracing::warn!("Invalid scale factor {}, returning frame unchanged", factor);
                return Ok(frame.clone());
            }
        },
        ResizeTarget::Exact(res) => res,
    };

    if dst_res.is_empty() {
        tracing::warn!(
            "Computed size {} is non-positive, returning frame unchanged",
            dst_res
        );
        return Ok(frame.clone());
    }

    if !frame.is_well_formed() {
        return Err(Error::FrameTransform(format!(
            "pixel buffer is {} bytes, expected {} for {}",
            frame.data.len(),
            Frame::expected_len(frame.width, frame.height),
            src_res
        )));
    }

    if dst_res == src_res {
        return Ok(frame.clone());
    }

    let src = ImageRef::new(frame.width, frame.height, &frame.data, PixelType::U8x3)
        .map_err(|e| Error::FrameTransform(format!("Invalid source image: {}", e)))?;
    let mut dst = Image::new(dst_res.width, dst_res.height, PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(kernel.resize_alg());
    let mut resizer = Resizer::new();
    resizer
        .resize(&src, &mut dst, &options)
        .map_err(|e: fr::ResizeError| Error::FrameTransform(format!("Resize failed: {}", e)))?;

    Ok(Frame {
        data: dst.into_vec(),
        width: dst_res.width,
        height: dst_res.height,
        pts: frame.pts,
    })
}
