//! File output
//!
//! Encodes frames and writes them to MP4, AVI, or MKV files using the
//! FFmpeg muxer. The muxer writes to a hidden sibling file which replaces the
//! target only when the output is closed, so a failed or empty run never
//! touches an existing file at the target path.

use crate::encode::software::EncoderSettings;
use crate::encode::{Codec, SoftwareEncoder};
use crate::error::{Error, Result};
use crate::types::{Frame, Resolution};
use std::path::{Path, PathBuf};

use super::{Container, FrameSink, SinkFactory, SinkSpec};

use ffmpeg_next as ffmpeg;

/// File output for encoded video
pub struct FileOutput {
    path: PathBuf,
    // Where the muxer actually writes until `close`
    staging: PathBuf,
    container: Container,
    // FFmpeg muxer, `None` once closed
    output_ctx: Option<ffmpeg::format::context::Output>,
    encoder: SoftwareEncoder,
    stream_index: usize,
    stream_time_base: ffmpeg::Rational,
    frames_written: u64,
    bytes_written: u64,
}

impl FileOutput {
    /// Create the file, open the encoder and write the container header
    pub fn create(
        path: impl Into<PathBuf>,
        container: Container,
        codec: Codec,
        resolution: Resolution,
        fps: f64,
    ) -> Result<Self> {
        let path = path.into();
        ffmpeg::init().map_err(|e| Error::FFmpeg(e.to_string()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::SinkUnopenable(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let staging = staging_path(&path);
        let mut output_ctx = ffmpeg::format::output_as(&staging, container.ffmpeg_format())
            .map_err(|e| {
                Error::SinkUnopenable(format!("Failed to create output context: {}", e))
            })?;

        let global_header = output_ctx
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let encoder = SoftwareEncoder::open(EncoderSettings {
            codec,
            resolution,
            fps,
            global_header,
            tag: container.uses_fourcc().then(|| codec.fourcc()),
        })?;

        let ff_codec = ffmpeg::encoder::find_by_name(codec.encoder_name());
        let mut stream = output_ctx
            .add_stream(ff_codec)
            .map_err(|e| Error::SinkUnopenable(format!("Failed to add stream: {}", e)))?;
        stream.set_parameters(encoder.context());
        stream.set_time_base(encoder.time_base());
        let stream_index = stream.index();

        output_ctx
            .write_header()
            .map_err(|e| Error::SinkUnopenable(format!("Failed to write header: {}", e)))?;

        // The muxer may pick its own time base while writing the header
        let stream_time_base = output_ctx
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or_else(|| encoder.time_base());

        tracing::info!(
            "File output initialized: {} ({}, {}, {})",
            path.display(),
            container,
            codec.display_name(),
            resolution
        );

        Ok(Self {
            path,
            staging,
            container,
            output_ctx: Some(output_ctx),
            encoder,
            stream_index,
            stream_time_base,
            frames_written: 0,
            bytes_written: 0,
        })
    }

    /// Get the output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn container(&self) -> Container {
        self.container
    }

    pub fn codec(&self) -> Codec {
        self.encoder.codec()
    }

    /// Payload bytes handed to the muxer
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// File being written until the output is committed
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    /// Flush the encoder and write the trailer. The trailer goes out even if
    /// the flush failed, so the file stays readable.
    fn finish(&mut self) -> Result<()> {
        let flushed = self
            .encoder
            .flush()
            .and_then(|packets| self.write_packets(packets));

        let trailer = match self.output_ctx.take() {
            Some(mut output_ctx) => output_ctx
                .write_trailer()
                .map_err(|e| Error::FFmpeg(format!("Failed to write trailer: {}", e))),
            None => Ok(()),
        };

        flushed.and(trailer)
    }

    fn write_packets(&mut self, packets: Vec<ffmpeg::Packet>) -> Result<()> {
        let output_ctx = self
            .output_ctx
            .as_mut()
            .ok_or_else(|| Error::FFmpeg("Output not initialized".into()))?;

        for mut packet in packets {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder.time_base(), self.stream_time_base);
            self.bytes_written += packet.size() as u64;
            packet
                .write_interleaved(output_ctx)
                .map_err(|e| Error::FFmpeg(format!("Failed to write packet: {}", e)))?;
        }
        Ok(())
    }
}

impl FrameSink for FileOutput {
    fn resolution(&self) -> Resolution {
        self.encoder.resolution()
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<bool> {
        if self.output_ctx.is_none() {
            tracing::warn!(
                "Dropping frame {}: {} is already closed",
                frame.pts,
                self.path.display()
            );
            return Ok(false);
        }

        let packets = self.encoder.encode(frame)?;
        self.write_packets(packets).map_err(|e| match e {
            Error::FFmpeg(msg) => Error::FrameTransform(msg),
            other => other,
        })?;
        self.frames_written += 1;
        Ok(true)
    }

    fn close(&mut self) -> Result<()> {
        if self.output_ctx.is_none() {
            return Ok(());
        }

        let finished = self.finish();
        let committed = std::fs::rename(&self.staging, &self.path).map_err(Error::from);

        tracing::info!(
            "File output finished: {} ({} frames, {} bytes, {:.2} MB)",
            self.path.display(),
            self.frames_written,
            self.bytes_written,
            self.bytes_written as f64 / 1_000_000.0
        );

        finished.and(committed)
    }

    fn discard(&mut self) -> Result<()> {
        if self.output_ctx.is_none() {
            return Ok(());
        }

        if let Err(e) = self.finish() {
            tracing::debug!("Ignoring finalize error for discarded {}: {}", self.path.display(), e);
        }
        remove_leftover(&self.staging);
        tracing::info!("Discarded output {}", self.path.display());
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn is_open(&self) -> bool {
        self.output_ctx.is_some()
    }
}

impl Drop for FileOutput {
    fn drop(&mut self) {
        // Write trailer if still open
        if self.output_ctx.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!("Failed to finalize {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Opens `FileOutput`s, retrying once with the container's fallback codec
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSinkFactory;

impl SinkFactory for FileSinkFactory {
    fn open(&self, spec: &SinkSpec) -> Result<Box<dyn FrameSink>> {
        let container = Container::from_path(&spec.path);
        let candidates = container.codec_preference(spec.preferred_codec);

        let (_, output) = open_with_fallback(
            &spec.path,
            &staging_path(&spec.path),
            &candidates,
            |codec| FileOutput::create(&spec.path, container, codec, spec.resolution, spec.fps),
        )?;
        Ok(Box::new(output))
    }
}

/// Hidden sibling of `path` the muxer writes to
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{}.partial", name))
}

/// Try each codec once, in order. Whatever a failed attempt left at
/// `staging` is removed before the next one; `path` itself is never touched.
pub(crate) fn open_with_fallback<T>(
    path: &Path,
    staging: &Path,
    candidates: &[Codec],
    mut open: impl FnMut(Codec) -> Result<T>,
) -> Result<(Codec, T)> {
    let mut failures = Vec::new();
    for (attempt, &codec) in candidates.iter().enumerate() {
        match open(codec) {
            Ok(sink) => {
                if attempt > 0 {
                    tracing::warn!(
                        "Writing {} with fallback codec {}",
                        path.display(),
                        codec.display_name()
                    );
                }
                return Ok((codec, sink));
            }
            Err(e) => {
                tracing::warn!(
                    "Codec {} unavailable for {}: {}",
                    codec.display_name(),
                    path.display(),
                    e
                );
                failures.push(format!("{}: {}", codec.name(), e));
                remove_leftover(staging);
            }
        }
    }

    Err(Error::SinkUnopenable(format!(
        "{} ({})",
        path.display(),
        failures.join("; ")
    )))
}

fn remove_leftover(staging: &Path) {
    if !staging.exists() {
        return;
    }
    if let Err(e) = std::fs::remove_file(staging) {
        tracing::warn!("Failed to remove {}: {}", staging.display(), e);
    }
}
