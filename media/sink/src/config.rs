/*!
    Sink configuration types.
*/

use serde::{Deserialize, Serialize};

use media_types::{
    AudioTrackInfo, CodecId, DisplayTransform, Geometry, PixelFormat, Rational, VideoTrackInfo,
};

/// Bits per pixel per frame used when the source reports no bitrate
const FALLBACK_BITS_PER_PIXEL: f64 = 0.1;

/**
    Container format for output.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// QuickTime movie, the default.
    #[default]
    QuickTime,
    /// MP4 container.
    Mp4,
}

impl ContainerFormat {
    /**
        Get the FFmpeg muxer name for this container.
    */
    pub fn ffmpeg_format_name(&self) -> &'static str {
        match self {
            Self::QuickTime => "mov",
            Self::Mp4 => "mp4",
        }
    }

    /**
        Get the typical file extension for this container.
    */
    pub fn extension(&self) -> &'static str {
        match self {
            Self::QuickTime => "mov",
            Self::Mp4 => "mp4",
        }
    }
}

/**
    Output video track settings.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoSettings {
    /// Codec to encode with.
    pub codec: CodecId,
    /// Track width in pixels.
    pub width: u32,
    /// Track height in pixels.
    pub height: u32,
    /// Layout of the buffers the pipeline appends.
    pub pixel_format: PixelFormat,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    /// Nominal frame rate.
    pub frame_rate: Rational,
    /// Time base of appended timestamps.
    pub time_base: Rational,
    /// Display transform stamped on the track.
    pub transform: DisplayTransform,
}

impl VideoSettings {
    /**
        Settings for an output track derived from a source track.

        The bitrate follows the source's; when the source doesn't report
        one it is estimated from the output size and frame rate.
    */
    pub fn for_track(
        source: &VideoTrackInfo,
        width: u32,
        height: u32,
        transform: DisplayTransform,
    ) -> Self {
        let bitrate = source
            .bitrate
            .filter(|&b| b > 0)
            .unwrap_or_else(|| estimate_bitrate(width, height, source.frame_rate));

        Self {
            codec: CodecId::H264,
            width,
            height,
            pixel_format: PixelFormat::Bgra,
            bitrate,
            frame_rate: source.frame_rate,
            time_base: source.time_base,
            transform,
        }
    }

    /**
        Override the target bitrate.
    */
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /**
        Geometry of the buffers this track accepts.
    */
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height, self.pixel_format)
    }
}

fn estimate_bitrate(width: u32, height: u32, frame_rate: Rational) -> u64 {
    let fps = if frame_rate.is_non_positive() {
        30.0
    } else {
        frame_rate.to_f64()
    };
    (width as f64 * height as f64 * fps * FALLBACK_BITS_PER_PIXEL) as u64
}

/**
    Configuration for a media sink.
*/
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Container format to use.
    pub format: ContainerFormat,
    /// Video track settings (None until set).
    pub video: Option<VideoSettings>,
    /// Audio track copied through from the source (None if no audio).
    pub audio: Option<AudioTrackInfo>,
    /// Move the movie header to the front of the file.
    pub fast_start: bool,
}

impl SinkConfig {
    /**
        Create a new sink configuration.
    */
    pub fn new(format: ContainerFormat) -> Self {
        Self {
            format,
            video: None,
            audio: None,
            fast_start: true,
        }
    }

    /**
        Create configuration for QuickTime output.
    */
    pub fn quicktime() -> Self {
        Self::new(ContainerFormat::QuickTime)
    }

    /**
        Create configuration for MP4 output.
    */
    pub fn mp4() -> Self {
        Self::new(ContainerFormat::Mp4)
    }

    /**
        Set video track settings.
    */
    pub fn with_video(mut self, settings: VideoSettings) -> Self {
        self.video = Some(settings);
        self
    }

    /**
        Set the audio track to copy through.
    */
    pub fn with_audio(mut self, info: AudioTrackInfo) -> Self {
        self.audio = Some(info);
        self
    }

    /**
        Set the audio track, or clear it with `None`.
    */
    pub fn with_optional_audio(mut self, info: Option<AudioTrackInfo>) -> Self {
        self.audio = info;
        self
    }

    /**
        Enable or disable fast start.
    */
    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = enabled;
        self
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}
