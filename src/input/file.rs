//! File input
//!
//! Demuxes and decodes the best video stream of a file with FFmpeg and hands
//! out frames converted to packed RGB24.

use crate::error::{Error, Result};
use crate::types::{FourCc, Frame, Resolution, VideoProperties, CHANNELS};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceOptions};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags as ScalerFlags};
use ffmpeg_next::Dictionary;

/// Decoding session over one video file
pub struct FileInput {
    path: PathBuf,
    properties: VideoProperties,
    input_ctx: Option<ffmpeg::format::context::Input>,
    decoder: Option<ffmpeg::decoder::Video>,
    scaler: Option<Scaler>,
    stream_index: usize,
    eof_sent: bool,
    frames_read: u64,
}

impl FileInput {
    /// Open a file and its best video stream
    pub fn open(path: &Path, options: &SourceOptions) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::FFmpeg(e.to_string()))?;

        let mut opts = Dictionary::new();
        if let Some(timeout) = options.io_timeout {
            opts.set("rw_timeout", &timeout.as_micros().to_string());
        }

        let input_ctx = ffmpeg::format::input_with_dictionary(&path, opts).map_err(|e| {
            Error::SourceUnreadable(format!("{}: {}", path.display(), e))
        })?;

        let (stream_index, fps, frame_count, parameters) = {
            let stream = input_ctx
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| {
                    Error::SourceUnreadable(format!("{}: no video stream", path.display()))
                })?;

            let mut rate = stream.avg_frame_rate();
            if rate.numerator() == 0 || rate.denominator() == 0 {
                rate = stream.rate();
            }
            let fps = if rate.denominator() == 0 {
                0.0
            } else {
                f64::from(rate)
            };
            let frame_count = u64::try_from(stream.frames()).ok().filter(|&n| n > 0);
            (stream.index(), fps, frame_count, stream.parameters())
        };

        let raw_tag = unsafe { (*parameters.as_ptr()).codec_tag };
        let codec_tag = match FourCc::from_u32(raw_tag) {
            tag if tag.is_empty() => FourCc::from_name(parameters.id().name()),
            tag => tag,
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .and_then(|context| context.decoder().video())
            .map_err(|e| Error::SourceUnreadable(format!("{}: {}", path.display(), e)))?;

        let resolution = Resolution::new(decoder.width(), decoder.height());
        if resolution.is_empty() {
            return Err(Error::SourceUnreadable(format!(
                "{}: video stream reports size {}",
                path.display(),
                resolution
            )));
        }

        let properties = VideoProperties {
            resolution,
            fps,
            codec_tag,
            frame_count,
        };

        tracing::info!(
            "Opened {}: {} @ {:.3} fps, codec {}",
            path.display(),
            resolution,
            fps,
            properties.codec_tag
        );

        Ok(Self {
            path: path.to_path_buf(),
            properties,
            input_ctx: Some(input_ctx),
            decoder: Some(decoder),
            scaler: None,
            stream_index,
            eof_sent: false,
            frames_read: 0,
        })
    }

    /// Get the input path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl FrameSource for FileInput {
    fn properties(&self) -> &VideoProperties {
        &self.properties
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Self {
            input_ctx,
            decoder,
            scaler,
            stream_index,
            eof_sent,
            frames_read,
            path,
            ..
        } = self;

        let (input_ctx, decoder) = match (input_ctx.as_mut(), decoder.as_mut()) {
            (Some(i), Some(d)) => (i, d),
            _ => return Ok(None),
        };

        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts = *frames_read as i64;
                    *frames_read += 1;
                    return to_rgb(scaler, &decoded, pts).map(Some);
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => {
                    return Err(Error::SourceUnreadable(format!(
                        "{}: decode failed: {}",
                        path.display(),
                        e
                    )))
                }
            }

            if *eof_sent {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(input_ctx) {
                Ok(()) => {
                    if packet.stream() != *stream_index {
                        continue;
                    }
                    if let Err(e) = decoder.send_packet(&packet) {
                        return Err(rejected_packet(path, *frames_read, e));
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    decoder.send_eof()?;
                    *eof_sent = true;
                }
                Err(e) => {
                    return Err(Error::SourceUnreadable(format!(
                        "{}: read failed: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
    }

    fn close(&mut self) {
        if self.input_ctx.is_none() {
            return;
        }
        self.scaler = None;
        self.decoder = None;
        self.input_ctx = None;
        tracing::debug!(
            "Closed {} after {} frames",
            self.path.display(),
            self.frames_read
        );
    }

    fn is_open(&self) -> bool {
        self.input_ctx.is_some()
    }
}

/// A packet the decoder refused costs (at least) the frame after `decoded`;
/// reported as a per-frame failure so the run can count it and continue
fn rejected_packet(path: &Path, decoded: u64, e: ffmpeg::Error) -> Error {
    tracing::warn!(
        "Dropping undecodable packet in {} after frame {}: {}",
        path.display(),
        decoded,
        e
    );
    Error::FrameTransform(format!(
        "{}: packet after frame {} rejected: {}",
        path.display(),
        decoded,
        e
    ))
}

/// Convert a decoded frame to packed RGB24, rebuilding the scaler whenever
/// the decoded format or size changes
fn to_rgb(scaler: &mut Option<Scaler>, decoded: &ffmpeg::frame::Video, pts: i64) -> Result<Frame> {
    let (width, height) = (decoded.width(), decoded.height());

    let stale = match scaler {
        Some(s) => {
            let input = s.input();
            input.format != decoded.format() || input.width != width || input.height != height
        }
        None => true,
    };
    if stale {
        let fresh = Scaler::get(
            decoded.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalerFlags::BILINEAR,
        )
        .map_err(|e| Error::FrameTransform(format!("Failed to create scaler: {}", e)))?;
        *scaler = Some(fresh);
    }

    let mut rgb = ffmpeg::frame::Video::empty();
    if let Some(s) = scaler.as_mut() {
        s.run(decoded, &mut rgb)
            .map_err(|e| Error::FrameTransform(format!("Color conversion failed: {}", e)))?;
    }

    let row = width as usize * CHANNELS;
    let stride = rgb.stride(0);
    let plane = rgb.data(0);
    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        data.extend_from_slice(&plane[y * stride..y * stride + row]);
    }

    Ok(Frame::from_rgb(data, width, height).with_pts(pts))
}
