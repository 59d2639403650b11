/*!
    In-memory scripted source.
*/

use std::{thread, time::Duration};

use tracing::{debug, trace};

use media_types::{
    AudioSample, AudioTrackInfo, CodecId, DisplayTransform, Error, Geometry, MediaAsset,
    MediaDuration, PixelFormat, Pts, Rational, Result, Rotation, VideoFrame, VideoTrackInfo,
};

use crate::{AudioReader, FrameSource, OpenedSource, TrackReader};

/// QuickTime's customary movie time base
const VIDEO_TIME_BASE: Rational = Rational { num: 1, den: 600 };
const AUDIO_SAMPLE_RATE: u32 = 44_100;
const AUDIO_FRAME_SIZE: u32 = 1024;

/**
    A source whose frames and samples are held in memory.

    Every call to [`FrameSource::open`] hands out fresh readers over clones
    of the scripted data, so one source can be opened repeatedly.

    Failures and pacing can be scripted per track: a decode failure at a
    given index, and a delay before every read.
*/
#[derive(Clone, Debug)]
pub struct MemorySource {
    asset: Option<MediaAsset>,
    video: Track<VideoFrame>,
    audio: Track<AudioSample>,
}

#[derive(Clone, Debug)]
struct Track<T> {
    items: Vec<T>,
    fail_at: Option<usize>,
    delay: Duration,
}

impl<T> Default for Track<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            fail_at: None,
            delay: Duration::ZERO,
        }
    }
}

impl MemorySource {
    /**
        Create a source for `asset` with no frames or samples yet.
    */
    pub fn new(asset: MediaAsset) -> Self {
        Self {
            asset: Some(asset),
            video: Track::default(),
            audio: Track::default(),
        }
    }

    /**
        Create a source with no video track. Opening it fails.
    */
    pub fn without_video() -> Self {
        Self {
            asset: None,
            video: Track::default(),
            audio: Track::default(),
        }
    }

    /**
        Create a video-only source of `count` BGRA frames.

        Frame `i` is stamped `i` frame intervals into the track and filled
        with the pixel `[i % 256, i / 256 % 256, 0, 255]`, so its index can be
        read back from any output pixel.
    */
    pub fn synthetic(width: u32, height: u32, count: usize, frame_rate: Rational) -> Self {
        let interval = frame_rate.frame_interval().unwrap_or(Duration::ZERO);
        let geometry = Geometry::new(width, height, PixelFormat::Bgra);

        let frames = (0..count)
            .map(|i| {
                let pts = Pts::from_duration(interval * i as u32, VIDEO_TIME_BASE);
                let pixel = [(i % 256) as u8, (i / 256 % 256) as u8, 0, 255];
                VideoFrame::filled(geometry, &pixel, pts, VIDEO_TIME_BASE)
            })
            .collect();

        let duration = if frame_rate.is_non_positive() {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(count as f64 / frame_rate.to_f64())
        };

        let asset = MediaAsset {
            video: VideoTrackInfo {
                width,
                height,
                frame_rate,
                time_base: VIDEO_TIME_BASE,
                transform: DisplayTransform::IDENTITY,
                bitrate: Some(geometry.byte_len() as u64 * 8),
                duration,
            },
            audio: None,
        };

        Self::new(asset).with_video_frames(frames)
    }

    /**
        Add an AAC-like audio track of `count` packets, each carrying
        1024 samples at 44.1 kHz.
    */
    pub fn with_synthetic_audio(self, count: usize) -> Self {
        let time_base = Rational::new(1, AUDIO_SAMPLE_RATE as i32);
        let info = AudioTrackInfo {
            codec: CodecId::Aac,
            channels: 2,
            sample_rate: AUDIO_SAMPLE_RATE,
            time_base,
            bitrate: Some(128_000),
            frame_size: AUDIO_FRAME_SIZE,
            // AudioSpecificConfig: AAC-LC, 44.1 kHz, stereo
            extradata: vec![0x12, 0x10],
        };

        let samples = (0..count)
            .map(|i| {
                AudioSample::new(
                    (i as u32).to_le_bytes().to_vec(),
                    Pts(i as i64 * AUDIO_FRAME_SIZE as i64),
                    MediaDuration(AUDIO_FRAME_SIZE as i64),
                    time_base,
                )
            })
            .collect();

        self.with_audio_samples(info, samples)
    }

    /**
        Replace the scripted video frames.
    */
    pub fn with_video_frames(mut self, frames: Vec<VideoFrame>) -> Self {
        self.video.items = frames;
        self
    }

    /**
        Replace the audio track and its scripted samples.
    */
    pub fn with_audio_samples(mut self, info: AudioTrackInfo, samples: Vec<AudioSample>) -> Self {
        if let Some(asset) = self.asset.as_mut() {
            asset.audio = Some(info);
        }
        self.audio.items = samples;
        self
    }

    /**
        Store `rotation` in the video track's display transform.

        Frames keep their stored layout; only the metadata changes, which is
        how rotated camera recordings look to a decoder.
    */
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        if let Some(asset) = self.asset.as_mut() {
            asset.video.transform = DisplayTransform::rotation(rotation);
        }
        self
    }

    /**
        Make the video reader fail with a decode error instead of returning
        the frame at `index`.
    */
    pub fn fail_video_at(mut self, index: usize) -> Self {
        self.video.fail_at = Some(index);
        self
    }

    /**
        Make the audio reader fail with a decode error instead of returning
        the sample at `index`.
    */
    pub fn fail_audio_at(mut self, index: usize) -> Self {
        self.audio.fail_at = Some(index);
        self
    }

    /**
        Sleep for `delay` before every video read.
    */
    pub fn with_video_delay(mut self, delay: Duration) -> Self {
        self.video.delay = delay;
        self
    }

    /**
        Sleep for `delay` before every audio read.
    */
    pub fn with_audio_delay(mut self, delay: Duration) -> Self {
        self.audio.delay = delay;
        self
    }

    pub fn asset(&self) -> Option<&MediaAsset> {
        self.asset.as_ref()
    }

    pub fn video_frames(&self) -> &[VideoFrame] {
        &self.video.items
    }

    pub fn audio_samples(&self) -> &[AudioSample] {
        &self.audio.items
    }
}

impl FrameSource for MemorySource {
    fn open(&self) -> Result<OpenedSource> {
        let asset = self
            .asset
            .clone()
            .ok_or_else(|| Error::asset_unreadable("no video track found"))?;

        let audio = asset
            .audio
            .is_some()
            .then(|| Box::new(MemoryReader::new("audio", self.audio.clone())) as AudioReader);

        debug!(
            width = asset.video.width,
            height = asset.video.height,
            frames = self.video.items.len(),
            samples = audio.as_ref().map_or(0, |_| self.audio.items.len()),
            rotation = asset.video.rotation().degrees(),
            "memory source opened"
        );

        Ok(OpenedSource {
            asset,
            video: Box::new(MemoryReader::new("video", self.video.clone())),
            audio,
        })
    }
}

struct MemoryReader<T> {
    track: &'static str,
    items: std::vec::IntoIter<T>,
    index: usize,
    fail_at: Option<usize>,
    delay: Duration,
}

impl<T> MemoryReader<T> {
    fn new(track: &'static str, script: Track<T>) -> Self {
        Self {
            track,
            items: script.items.into_iter(),
            index: 0,
            fail_at: script.fail_at,
            delay: script.delay,
        }
    }
}

impl<T: Send> TrackReader<T> for MemoryReader<T> {
    fn next(&mut self) -> Result<Option<T>> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_at == Some(self.index) {
            debug!(track = self.track, index = self.index, "scripted read failure");
            return Err(Error::decode(format!(
                "scripted {} failure at sample {}",
                self.track, self.index
            )));
        }
        self.index += 1;
        let item = self.items.next();
        if item.is_none() {
            trace!(track = self.track, read = self.index - 1, "memory track exhausted");
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<T>(reader: &mut dyn TrackReader<T>) -> Result<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = reader.next()? {
            out.push(item);
        }
        Ok(out)
    }

    #[test]
    fn synthetic_frames_are_ordered() {
        let source = MemorySource::synthetic(4, 2, 5, Rational::new(30, 1));
        let mut opened = source.open().unwrap();
        let frames = drain(opened.video.as_mut()).unwrap();

        assert_eq!(frames.len(), 5);
        let stamps: Vec<i64> = frames.iter().map(|f| f.pts.0).collect();
        assert_eq!(stamps, vec![0, 20, 40, 60, 80]);
        assert_eq!(frames[3].data[0], 3);
        assert!(frames.iter().all(|f| f.is_well_formed()));
        assert!(opened.audio.is_none());
    }

    #[test]
    fn asset_describes_frames() {
        let source = MemorySource::synthetic(4, 2, 30, Rational::new(30, 1));
        let asset = source.open().unwrap().asset;
        assert_eq!(asset.video.estimated_frame_count(), 30);
        assert_eq!(asset.duration(), Duration::from_secs(1));
        assert!(!asset.has_audio());
    }

    #[test]
    fn missing_video_is_unreadable() {
        let err = MemorySource::without_video().open().unwrap_err();
        assert!(matches!(err, Error::AssetUnreadable { .. }));
    }

    #[test]
    fn scripted_failure_stops_at_index() {
        let source = MemorySource::synthetic(2, 2, 10, Rational::new(30, 1)).fail_video_at(5);
        let mut opened = source.open().unwrap();
        for _ in 0..5 {
            assert!(opened.video.next().unwrap().is_some());
        }
        let err = opened.video.next().unwrap_err();
        assert!(matches!(err, Error::DecodeFailed { .. }));
    }

    #[test]
    fn audio_track_is_independent() {
        let source = MemorySource::synthetic(2, 2, 3, Rational::new(30, 1)).with_synthetic_audio(7);
        let opened = source.open().unwrap();
        assert!(opened.asset.has_audio());

        let mut audio = opened.audio.unwrap();
        let samples = drain(audio.as_mut()).unwrap();
        assert_eq!(samples.len(), 7);
        assert_eq!(samples[2].pts, Pts(2048));

        // Video reader is untouched by draining audio
        let mut video = opened.video;
        assert_eq!(drain(video.as_mut()).unwrap().len(), 3);
    }

    #[test]
    fn reopening_restarts_tracks() {
        let source = MemorySource::synthetic(2, 2, 2, Rational::new(25, 1));
        for _ in 0..2 {
            let mut opened = source.open().unwrap();
            assert_eq!(drain(opened.video.as_mut()).unwrap().len(), 2);
        }
    }

    #[test]
    fn rotation_is_metadata_only() {
        let source = MemorySource::synthetic(4, 2, 1, Rational::new(30, 1)).with_rotation(Rotation::Deg90);
        let mut opened = source.open().unwrap();
        assert_eq!(opened.asset.video.rotation(), Rotation::Deg90);
        let frame = opened.video.next().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (4, 2));
    }
}
