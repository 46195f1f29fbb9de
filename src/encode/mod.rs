//! Video encoding module
//!
//! Software encoding of RGB24 frames through FFmpeg. Codecs are limited to
//! the ones the container preference table can pick.

pub mod software;

use crate::error::{Error, Result};
use crate::types::FourCc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub use software::SoftwareEncoder;

/// Supported output codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Codec {
    /// MPEG-4 Part 2 - Ships with every FFmpeg build
    Mpeg4,
    /// Xvid - MPEG-4 Part 2 via libxvid, the usual AVI payload
    Xvid,
    /// H.264/AVC via libx264
    H264,
}

impl Codec {
    pub const ALL: [Codec; 3] = [Codec::Mpeg4, Codec::Xvid, Codec::H264];

    /// FFmpeg encoder name
    pub fn encoder_name(&self) -> &'static str {
        match self {
            Codec::Mpeg4 => "mpeg4",
            Codec::Xvid => "libxvid",
            Codec::H264 => "libx264",
        }
    }

    /// Four-character tag written for this codec
    pub fn fourcc(&self) -> FourCc {
        FourCc::from_name(match self {
            Codec::Mpeg4 => "mp4v",
            Codec::Xvid => "XVID",
            Codec::H264 => "avc1",
        })
    }

    /// Canonical short name, as accepted by `--codec`
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Mpeg4 => "mpeg4",
            Codec::Xvid => "xvid",
            Codec::H264 => "h264",
        }
    }

    /// Get human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Codec::Mpeg4 => "MPEG-4 Part 2",
            Codec::Xvid => "Xvid",
            Codec::H264 => "H.264 (AVC)",
        }
    }

    /// Check whether the linked FFmpeg has this encoder
    pub fn is_available(&self) -> bool {
        if ffmpeg_next::init().is_err() {
            return false;
        }
        ffmpeg_next::encoder::find_by_name(self.encoder_name()).is_some()
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mpeg4" | "mp4v" => Ok(Codec::Mpeg4),
            "xvid" | "libxvid" => Ok(Codec::Xvid),
            "h264" | "avc1" | "x264" | "libx264" => Ok(Codec::H264),
            _ => Err(Error::InvalidParameter(format!(
                "unknown codec '{}', expected one of mpeg4, xvid, h264",
                s
            ))),
        }
    }
}

impl TryFrom<String> for Codec {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Codec> for String {
    fn from(codec: Codec) -> Self {
        codec.name().to_string()
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
