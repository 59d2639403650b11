/*!
    Track and asset descriptors.
*/

use std::time::Duration;

use crate::{CodecId, DisplayTransform, Rational, Rotation};

/**
    Description of a source video track.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct VideoTrackInfo {
    /// Natural (stored) width in pixels, before any display rotation.
    pub width: u32,
    /// Natural (stored) height in pixels, before any display rotation.
    pub height: u32,
    /// Nominal frame rate.
    pub frame_rate: Rational,
    /// Time base of the track's timestamps.
    pub time_base: Rational,
    /// Display transform stored with the track.
    pub transform: DisplayTransform,
    /// Estimated data rate in bits per second, if known.
    pub bitrate: Option<u64>,
    /// Track duration.
    pub duration: Duration,
}

impl VideoTrackInfo {
    /**
        Quarter turn encoded in the track's display transform.
    */
    pub fn rotation(&self) -> Rotation {
        self.transform.quarter_turn()
    }

    /**
        Estimated number of frames: duration times nominal frame rate.

        Exact for constant frame rate sources, approximate otherwise.
    */
    pub fn estimated_frame_count(&self) -> u64 {
        if self.frame_rate.is_non_positive() {
            return 0;
        }
        (self.duration.as_secs_f64() * self.frame_rate.to_f64()).round() as u64
    }
}

/**
    Description of a source audio track.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct AudioTrackInfo {
    /// Codec of the (copied through) audio payload.
    pub codec: CodecId,
    /// Number of channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Time base of the track's timestamps.
    pub time_base: Rational,
    /// Average bitrate in bits per second, if known.
    pub bitrate: Option<u64>,
    /// Samples per channel in one coded frame, 0 if variable.
    pub frame_size: u32,
    /// Codec-specific setup data (e.g. an AAC AudioSpecificConfig).
    pub extradata: Vec<u8>,
}

/**
    Immutable description of a source asset, derived once when the source
    is opened.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct MediaAsset {
    pub video: VideoTrackInfo,
    pub audio: Option<AudioTrackInfo>,
}

impl MediaAsset {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn duration(&self) -> Duration {
        self.video.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(duration: Duration, frame_rate: Rational) -> VideoTrackInfo {
        VideoTrackInfo {
            width: 1920,
            height: 1080,
            frame_rate,
            time_base: Rational::new(1, 600),
            transform: DisplayTransform::IDENTITY,
            bitrate: None,
            duration,
        }
    }

    #[test]
    fn frame_estimate_constant_rate() {
        let info = track(Duration::from_secs(10), Rational::new(30, 1));
        assert_eq!(info.estimated_frame_count(), 300);
    }

    #[test]
    fn frame_estimate_ntsc() {
        let info = track(Duration::from_secs(10), Rational::new(30000, 1001));
        assert_eq!(info.estimated_frame_count(), 300);
    }

    #[test]
    fn frame_estimate_unknown_rate() {
        let info = track(Duration::from_secs(10), Rational::new(0, 1));
        assert_eq!(info.estimated_frame_count(), 0);
    }

    #[test]
    fn rotation_from_transform() {
        let mut info = track(Duration::from_secs(1), Rational::new(30, 1));
        info.transform = DisplayTransform::rotation(Rotation::Deg90);
        assert_eq!(info.rotation(), Rotation::Deg90);
    }
}
