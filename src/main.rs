//! UpscaleFx CLI
//!
//! Command-line interface for upscaling videos and inspecting inputs.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use upscalefx::{
    config::{parse_dimensions, SCALE_PRESETS},
    CancelToken, Codec, Kernel, Pipeline, ScaleRequest, UpscaleConfig,
};

#[derive(Parser)]
#[command(name = "upscalefx")]
#[command(about = "Frame-accurate video upscaling - classical kernels or learned super-resolution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upscale a video
    Upscale {
        /// Input video
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output video; the extension picks the container (mp4, avi, mkv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Multiply width and height by this factor
        #[arg(short = 'f', long, conflicts_with_all = ["size", "scale"])]
        scale_factor: Option<f64>,

        /// Exact output size (e.g., 1920x1080)
        #[arg(long, conflicts_with = "scale")]
        size: Option<String>,

        /// Named scale option (2x, 1.5x, 720p, 1080p, 4k, WxH)
        #[arg(short, long)]
        scale: Option<String>,

        /// Interpolation kernel (nearest, linear, cubic, area, lanczos)
        #[arg(long)]
        interpolation: Option<String>,

        /// ONNX super-resolution model
        #[arg(short, long)]
        model_path: Option<PathBuf>,

        /// Preferred codec (mpeg4, xvid, h264)
        #[arg(short, long)]
        codec: Option<String>,

        /// Per-frame inference deadline in seconds
        #[arg(long)]
        inference_timeout: Option<u64>,

        /// TOML config file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show properties of a video
    Info {
        /// Video to inspect
        input: PathBuf,
    },

    /// List interpolation kernels
    Kernels,

    /// List named scale options
    Presets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("upscalefx=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Upscale {
            input,
            output,
            scale_factor,
            size,
            scale,
            interpolation,
            model_path,
            codec,
            inference_timeout,
            config,
        } => {
            let mut cfg = match config {
                Some(path) => UpscaleConfig::from_toml_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => UpscaleConfig::default(),
            };

            if let Some(input) = input {
                cfg.input = input;
            }
            if let Some(output) = output {
                cfg.output = output;
            }
            if let Some(request) = scale_request(scale_factor, size, scale)? {
                cfg.scale = request;
            }
            if let Some(name) = interpolation {
                cfg.kernel = Kernel::parse_lenient(&name);
            }
            if let Some(model) = model_path {
                cfg.model_path = Some(model);
            }
            if let Some(codec) = codec {
                cfg.codec = Some(codec.parse::<Codec>()?);
            }
            if let Some(secs) = inference_timeout {
                cfg.inference_timeout_secs = secs;
            }

            cmd_upscale(cfg).await
        }
        Commands::Info { input } => cmd_info(input),
        Commands::Kernels => cmd_kernels(),
        Commands::Presets => cmd_presets(),
    }
}

/// Combine the three mutually exclusive size flags
fn scale_request(
    factor: Option<f64>,
    size: Option<String>,
    scale: Option<String>,
) -> anyhow::Result<Option<ScaleRequest>> {
    if let Some(option) = scale {
        return Ok(Some(option.parse()?));
    }
    let dimensions = size.as_deref().map(parse_dimensions).transpose()?;
    if factor.is_none() && dimensions.is_none() {
        return Ok(None);
    }
    Ok(Some(ScaleRequest::from_parts(factor, dimensions)?))
}

async fn cmd_upscale(config: UpscaleConfig) -> anyhow::Result<()> {
    let cancel = CancelToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current frame");
            ctrl_c.cancel();
        }
    });

    let run = tokio::task::spawn_blocking(move || Pipeline::new(config).run(&cancel));
    let report = run.await??;

    println!("\nUpscale {}", report.status);
    println!("  Output: {}", report.output.display());
    println!(
        "  Size: {} -> {}",
        report.source_resolution, report.target_resolution
    );
    println!("  Strategy: {}", report.strategy);
    println!("  Frames read: {}", report.frames_read);
    println!("  Frames written: {}", report.frames_written);
    if report.frames_skipped > 0 {
        println!("  Frames skipped: {}", report.frames_skipped);
    }
    if report.source_truncated {
        println!("  Source ended early");
    }
    println!("  Time: {:.2}s", report.elapsed.as_secs_f64());

    Ok(())
}

fn cmd_info(input: PathBuf) -> anyhow::Result<()> {
    let props = upscalefx::probe(&input)?;

    println!("{}", input.display());
    println!("  Resolution: {}", props.resolution);
    println!("  Aspect ratio: {:.3}", props.resolution.aspect_ratio());
    println!("  Frame rate: {:.3}", props.fps);
    let fps = props.effective_fps(upscalefx::types::DEFAULT_FPS);
    if fps != props.fps {
        println!("  (implausible, {:.1} would be used)", fps);
    }
    println!("  Codec tag: {}", props.codec_tag);
    if let Some(frames) = props.frame_count {
        println!("  Frames: {}", frames);
    }

    Ok(())
}

fn cmd_kernels() -> anyhow::Result<()> {
    println!("Interpolation Kernels");
    println!("=====================\n");

    for kernel in Kernel::ALL {
        println!("  {:<10} {}", kernel.name(), kernel.description());
    }

    println!("\nOutput codecs:");
    for codec in Codec::ALL {
        println!(
            "  {:<10} {} ({}){}",
            codec.name(),
            codec.display_name(),
            codec.fourcc(),
            if codec.is_available() { "" } else { " - not in this FFmpeg build" }
        );
    }

    Ok(())
}

fn cmd_presets() -> anyhow::Result<()> {
    println!("Scale Options");
    println!("=============\n");

    for (name, description) in SCALE_PRESETS {
        println!("  {:<8} {}", name, description);
    }
    println!("  {:<8} {}", "WxH", "exact output size, e.g. 1920x1080");

    println!("\nUsage: upscalefx upscale -i in.mp4 -o out.mp4 --scale 1080p");

    Ok(())
}
