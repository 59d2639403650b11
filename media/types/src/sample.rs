/*!
    Track identification and the tagged sample variant.
*/

use crate::{AudioSample, Pts, VideoFrame};

/**
    Kind of media track.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Video track
    Video,
    /// Audio track
    Audio,
}

impl TrackKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    pub const fn other(self) -> Self {
        match self {
            Self::Video => Self::Audio,
            Self::Audio => Self::Video,
        }
    }
}

/**
    A sample from either track.

    Code that routes samples by track matches on this instead of inspecting
    the payload type at runtime.
*/
#[derive(Clone, Debug)]
pub enum Sample {
    Video(VideoFrame),
    Audio(AudioSample),
}

impl Sample {
    pub fn track(&self) -> TrackKind {
        match self {
            Self::Video(_) => TrackKind::Video,
            Self::Audio(_) => TrackKind::Audio,
        }
    }

    pub fn pts(&self) -> Pts {
        match self {
            Self::Video(frame) => frame.pts,
            Self::Audio(sample) => sample.pts,
        }
    }
}

impl From<VideoFrame> for Sample {
    fn from(frame: VideoFrame) -> Self {
        Self::Video(frame)
    }
}

impl From<AudioSample> for Sample {
    fn from(sample: AudioSample) -> Self {
        Self::Audio(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MediaDuration, PixelFormat, Rational};

    #[test]
    fn sample_dispatch() {
        let tb = Rational::new(1, 1000);
        let video: Sample = VideoFrame::new(vec![], 0, 0, PixelFormat::Bgra, Pts(7), tb).into();
        let audio: Sample = AudioSample::new(vec![], Pts(9), MediaDuration(1), tb).into();
        assert_eq!(video.track(), TrackKind::Video);
        assert_eq!(audio.track(), TrackKind::Audio);
        assert_eq!(video.pts(), Pts(7));
        assert_eq!(audio.pts(), Pts(9));
    }

    #[test]
    fn track_names() {
        assert_eq!(TrackKind::Video.name(), "video");
        assert_eq!(TrackKind::Audio.name(), "audio");
        assert_eq!(TrackKind::Video.other(), TrackKind::Audio);
        assert_eq!(TrackKind::Audio.other(), TrackKind::Video);
    }
}
