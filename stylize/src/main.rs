use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use media_sink::{ContainerFormat, ManifestSinkFactory};
use media_source::MemorySource;
use media_types::Rational;
use stylize::{Pipeline, PipelineConfig, PixelFilter, RotationPolicy, logging, still};

#[derive(Parser, Debug)]
#[command(name = "stylize")]
#[command(about = "Apply a per-frame style transform to videos and images")]
struct Cli {
    /// Log debug output (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Style a video file and write the result as a new movie
    #[cfg(feature = "ffmpeg")]
    Process {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Play a video file through the live recording path in real time
    #[cfg(feature = "ffmpeg")]
    Replay {
        input: PathBuf,
        output: PathBuf,
        /// Save a still of the first frame here
        #[arg(long)]
        still: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Print what the pipeline would see in a video file
    #[cfg(feature = "ffmpeg")]
    Probe { input: PathBuf },

    /// Style a single image
    Image {
        input: PathBuf,
        output: PathBuf,
        /// Transform to apply
        #[arg(short, long, default_value = "grayscale")]
        filter: PixelFilter,
    },

    /// Run the pipeline over generated frames and write a JSON manifest
    Synthetic {
        output: PathBuf,
        /// Number of frames to generate
        #[arg(short = 'n', long, default_value = "90")]
        frames: usize,
        #[arg(long, default_value = "320")]
        width: u32,
        #[arg(long, default_value = "180")]
        height: u32,
        /// Generate an audio track alongside the video
        #[arg(long)]
        audio: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Transform to apply: identity, grayscale, invert, posterize[:levels]
    #[arg(short, long, default_value = "grayscale")]
    filter: PixelFilter,

    /// JSON file with pipeline settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of output buffers in flight
    #[arg(long)]
    pool_capacity: Option<usize>,

    /// Output video bitrate in bits per second
    #[arg(long)]
    bitrate: Option<u64>,

    /// Write MP4 instead of QuickTime
    #[arg(long)]
    mp4: bool,

    /// Only bake 90 degree rotations, keep other angles as track metadata
    #[arg(long)]
    quarter_turn_only: bool,
}

impl PipelineArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(capacity) = self.pool_capacity {
            config.pool_capacity = capacity;
        }
        if let Some(bitrate) = self.bitrate {
            config.video_bitrate = Some(bitrate);
        }
        if self.mp4 {
            config.container = ContainerFormat::Mp4;
        }
        if self.quarter_turn_only {
            config.rotation_policy = RotationPolicy::QuarterTurnOnly;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        #[cfg(feature = "ffmpeg")]
        Command::Process {
            input,
            output,
            pipeline,
        } => files::process(&input, &output, &pipeline),
        #[cfg(feature = "ffmpeg")]
        Command::Replay {
            input,
            output,
            still,
            pipeline,
        } => files::replay(&input, &output, still.as_deref(), &pipeline),
        #[cfg(feature = "ffmpeg")]
        Command::Probe { input } => files::probe(&input),
        Command::Image {
            input,
            output,
            mut filter,
        } => {
            let report = still::process_image(&input, &output, &mut filter)
                .with_context(|| format!("failed to process {}", input.display()))?;
            println!(
                "{} ({}x{}, filter {filter}{})",
                output.display(),
                report.width,
                report.height,
                if report.transformed { "" } else { ", transform failed" }
            );
            Ok(())
        }
        Command::Synthetic {
            output,
            frames,
            width,
            height,
            audio,
            pipeline,
        } => synthetic(&output, frames, width, height, audio, &pipeline),
    }
}

fn synthetic(
    output: &Path,
    frames: usize,
    width: u32,
    height: u32,
    audio: bool,
    args: &PipelineArgs,
) -> Result<()> {
    let mut source = MemorySource::synthetic(width, height, frames, Rational::new(30, 1));
    if audio {
        // Roughly as long as the video at 44.1 kHz with 1024-sample packets
        let packets = (frames as f64 / 30.0 * 44_100.0 / 1024.0).ceil() as usize;
        source = source.with_synthetic_audio(packets);
    }

    let report = Pipeline::new(
        source,
        Box::new(args.filter),
        ManifestSinkFactory::default(),
        output,
    )
    .with_config(args.config()?)
    .on_progress(progress_logger())
    .run()
    .context("synthetic run failed")?;

    println!(
        "{}: {} frames, {} audio samples, {:.1} fps",
        report.output.display(),
        report.frames_written,
        report.audio_samples_written,
        report.fps()
    );
    Ok(())
}

/**
    Log progress every ten percent.
*/
fn progress_logger() -> impl FnMut(f64) + Send + 'static {
    let mut next = 0.1;
    move |fraction| {
        if fraction >= next {
            info!("{:.0}% done", fraction * 100.0);
            while next <= fraction {
                next += 0.1;
            }
        }
    }
}

#[cfg(feature = "ffmpeg")]
mod files {
    use std::{
        path::Path,
        thread,
        time::{Duration, Instant},
    };

    use anyhow::{Context, Result, bail};
    use tracing::{info, warn};

    use media_sink::FileSinkFactory;
    use media_source::{FileSource, FrameSource, OpenedSource, TrackReader};
    use stylize::{Pipeline, RecordingSession, still};

    use super::{PipelineArgs, progress_logger};

    pub fn process(input: &Path, output: &Path, args: &PipelineArgs) -> Result<()> {
        let report = Pipeline::new(
            FileSource::new(input),
            Box::new(args.filter),
            FileSinkFactory,
            output,
        )
        .with_config(args.config()?)
        .on_progress(progress_logger())
        .run()
        .with_context(|| format!("failed to process {}", input.display()))?;

        println!(
            "{}: {} frames in {:.1}s ({:.1} fps), {} passed through untransformed",
            report.output.display(),
            report.frames_written,
            report.elapsed.as_secs_f64(),
            report.fps(),
            report.transform_failures
        );
        Ok(())
    }

    pub fn probe(input: &Path) -> Result<()> {
        let asset = FileSource::new(input)
            .probe()
            .with_context(|| format!("failed to probe {}", input.display()))?;
        let video = &asset.video;
        println!("video: {}x{}", video.width, video.height);
        println!("  frame rate: {:.3}", video.frame_rate.to_f64());
        println!("  time base: {}", video.time_base);
        println!("  rotation: {} degrees", video.rotation().degrees());
        println!("  duration: {:.3}s", video.duration.as_secs_f64());
        println!("  estimated frames: {}", video.estimated_frame_count());
        match video.bitrate {
            Some(bitrate) => println!("  bitrate: {bitrate}"),
            None => println!("  bitrate: unknown"),
        }
        match &asset.audio {
            Some(audio) => println!(
                "audio: {:?}, {} channels, {} Hz",
                audio.codec, audio.channels, audio.sample_rate
            ),
            None => println!("audio: none"),
        }
        Ok(())
    }

    /**
        Feed a file's frames and samples to a recording session at the pace
        they would arrive from a capture device.
    */
    pub fn replay(
        input: &Path,
        output: &Path,
        still_path: Option<&Path>,
        args: &PipelineArgs,
    ) -> Result<()> {
        let OpenedSource {
            asset,
            mut video,
            audio,
        } = FileSource::new(input)
            .open()
            .with_context(|| format!("failed to open {}", input.display()))?;

        let session = RecordingSession::new(
            asset,
            Box::new(args.filter),
            FileSinkFactory,
            args.config()?,
        );
        if let Some(path) = still_path {
            let path = path.to_path_buf();
            session.set_on_still(move |frame| {
                if let Err(e) = still::save_frame(&frame, &path) {
                    warn!(error = %e, "could not save still");
                }
            });
            session.capture_still();
        }

        session.start(output)?;
        let start = Instant::now();
        let session = &session;
        thread::scope(|scope| -> Result<()> {
            // Audio has no transform to wait on, so it is fed from its own thread
            let audio_feed = audio.map(|mut reader| {
                scope.spawn(move || -> Result<()> {
                    while let Some(sample) = reader.next()? {
                        pace(start, sample.presentation_time());
                        session.submit_audio(sample);
                    }
                    Ok(())
                })
            });
            while let Some(frame) = video.next()? {
                pace(start, frame.presentation_time());
                session.submit_video(frame);
            }
            if let Some(handle) = audio_feed {
                match handle.join() {
                    Ok(result) => result?,
                    Err(_) => bail!("audio feed panicked"),
                }
            }
            Ok(())
        })?;

        session.wait_idle(Duration::from_secs(10));
        let stats = session.stats();
        match session.stop()? {
            Some(path) => info!(path = %path.display(), "recording saved"),
            None => bail!("session was not recording"),
        }
        println!(
            "{}: {} of {} frames recorded, {} dropped while the transform was busy",
            output.display(),
            stats.frames_written,
            stats.frames_submitted,
            stats.frames_dropped
        );
        Ok(())
    }

    fn pace(start: Instant, at: Duration) {
        let due = start + at;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}
