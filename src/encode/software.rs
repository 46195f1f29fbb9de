//! Software (CPU) encoder via FFmpeg
//!
//! Takes packed RGB24 frames, converts them to YUV420P and feeds one of the
//! CPU encoders:
//! - mpeg4 (built into libavcodec)
//! - libxvid
//! - libx264

use crate::error::{Error, Result};
use crate::types::{FourCc, Frame, Resolution, CHANNELS};

use super::Codec;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context as Scaler, Flags as ScalerFlags};
use ffmpeg_next::Dictionary;

/// Target bits per pixel for the bitrate-controlled MPEG-4 encoders
const BITS_PER_PIXEL: f64 = 0.15;

/// Largest time base denominator MPEG-4 Part 2 accepts
const MAX_TIME_BASE_DEN: i32 = 65535;

/// Encoder settings fixed for the life of one output
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub codec: Codec,
    pub resolution: Resolution,
    pub fps: f64,
    /// Container stores codec headers out of band (mp4, mkv)
    pub global_header: bool,
    /// Tag to force into the stream, for containers that key on it
    pub tag: Option<FourCc>,
}

/// Software encoder using FFmpeg CPU codecs
pub struct SoftwareEncoder {
    settings: EncoderSettings,
    encoder: ffmpeg::encoder::Video,
    scaler: Scaler,
    time_base: ffmpeg::Rational,
    next_pts: i64,
    frames_encoded: u64,
}

impl SoftwareEncoder {
    /// Open an encoder. Fails with `SinkUnopenable` when the codec is missing
    /// from the linked FFmpeg or rejects the settings.
    pub fn open(settings: EncoderSettings) -> Result<Self> {
        ffmpeg::init().map_err(|e| Error::FFmpeg(e.to_string()))?;

        let encoder_name = settings.codec.encoder_name();
        let codec = ffmpeg::encoder::find_by_name(encoder_name).ok_or_else(|| {
            Error::SinkUnopenable(format!("Encoder {} not found", encoder_name))
        })?;

        let Resolution { width, height } = settings.resolution;
        let context = ffmpeg::codec::context::Context::new_with_codec(codec);
        let mut encoder = context
            .encoder()
            .video()
            .map_err(|e| Error::SinkUnopenable(e.to_string()))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);

        let frame_rate = frame_rate(settings.fps);
        let time_base = frame_rate.invert();
        encoder.set_frame_rate(Some(frame_rate));
        encoder.set_time_base(time_base);

        if settings.global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        if let Some(tag) = &settings.tag {
            unsafe {
                (*encoder.as_mut_ptr()).codec_tag = tag.to_u32();
            }
        }

        let mut opts = Dictionary::new();
        opts.set("threads", &optimal_thread_count().to_string());
        match settings.codec {
            Codec::H264 => {
                opts.set("preset", "medium");
                opts.set("crf", "20");
            }
            Codec::Mpeg4 | Codec::Xvid => {
                let bitrate = settings.resolution.pixels() as f64 * settings.fps * BITS_PER_PIXEL;
                encoder.set_bit_rate(bitrate.max(1_000_000.0) as usize);
            }
        }

        let encoder = encoder.open_with(opts).map_err(|e| {
            Error::SinkUnopenable(format!("Failed to open encoder {}: {}", encoder_name, e))
        })?;

        let scaler = Scaler::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            ScalerFlags::BILINEAR,
        )
        .map_err(|e| Error::SinkUnopenable(format!("Failed to create scaler: {}", e)))?;

        tracing::info!(
            "Software encoder initialized: {} {} @ {:.3} fps",
            encoder_name,
            settings.resolution,
            settings.fps
        );

        Ok(Self {
            settings,
            encoder,
            scaler,
            time_base,
            next_pts: 0,
            frames_encoded: 0,
        })
    }

    pub fn codec(&self) -> Codec {
        self.settings.codec
    }

    pub fn resolution(&self) -> Resolution {
        self.settings.resolution
    }

    /// Encoder time base, one tick per frame
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Opened codec context, for copying parameters into a stream
    pub fn context(&self) -> &ffmpeg::encoder::Video {
        &self.encoder
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Encode one frame, returning whatever packets the codec released
    pub fn encode(&mut self, frame: &Frame) -> Result<Vec<ffmpeg::Packet>> {
        let resolution = self.settings.resolution;
        if frame.resolution() != resolution || !frame.is_well_formed() {
            return Err(Error::FrameTransform(format!(
                "frame is {} ({} bytes), encoder expects {}",
                frame.resolution(),
                frame.data.len(),
                resolution
            )));
        }

        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, resolution.width, resolution.height);
        let row = resolution.width as usize * CHANNELS;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (y, src) in frame.data.chunks_exact(row).enumerate() {
            plane[y * stride..y * stride + row].copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .map_err(|e| Error::FrameTransform(format!("Color conversion failed: {}", e)))?;
        yuv.set_pts(Some(self.next_pts));

        self.encoder
            .send_frame(&yuv)
            .map_err(|e| Error::FrameTransform(format!("Failed to send frame: {}", e)))?;

        self.next_pts += 1;
        self.frames_encoded += 1;
        self.drain()
    }

    /// Signal end of stream and collect the delayed packets
    pub fn flush(&mut self) -> Result<Vec<ffmpeg::Packet>> {
        self.encoder
            .send_eof()
            .map_err(|e| Error::FFmpeg(format!("Failed to send EOF: {}", e)))?;
        let packets = self.drain()?;

        tracing::debug!(
            "Software encoder flushed: {} frames, {} trailing packets",
            self.frames_encoded,
            packets.len()
        );
        Ok(packets)
    }

    fn drain(&mut self) -> Result<Vec<ffmpeg::Packet>> {
        let mut packets = Vec::new();
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => packets.push(packet),
                Err(ffmpeg::Error::Eof) => break,
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(e) => {
                    return Err(Error::FrameTransform(format!(
                        "Failed to receive packet: {}",
                        e
                    )))
                }
            }
        }
        Ok(packets)
    }
}

/// Frame rate as a rational MPEG-4 can carry
fn frame_rate(fps: f64) -> ffmpeg::Rational {
    let q = unsafe { ffmpeg::ffi::av_d2q(fps, MAX_TIME_BASE_DEN) };
    ffmpeg::Rational::from(q)
}

/// Get optimal thread count for encoding
fn optimal_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
        .min(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_is_exact_for_common_rates() {
        let r = frame_rate(25.0);
        assert_eq!((r.numerator(), r.denominator()), (25, 1));

        let ntsc = frame_rate(30000.0 / 1001.0);
        assert!((f64::from(ntsc) - 30000.0 / 1001.0).abs() < 1e-6);
    }

    #[test]
    fn test_frame_rate_denominator_is_bounded() {
        let r = frame_rate(23.976_023_976);
        assert!(r.denominator() <= MAX_TIME_BASE_DEN);
        assert!((f64::from(r) - 23.976).abs() < 0.001);
    }

    #[test]
    fn test_thread_count_is_positive() {
        let n = optimal_thread_count();
        assert!((1..=16).contains(&n));
    }
}
