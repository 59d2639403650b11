/*!
    A sink that records what it is given and writes a JSON manifest.
*/

use std::{
    collections::VecDeque,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use media_types::{AudioSample, Error, Pts, Result, TrackKind};

use crate::{ContainerFormat, FrameBuffer, FrameSink, SinkConfig, SinkFactory};

/**
    One call observed by a [`ManifestSink`].
*/
#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    SessionStarted { at: Pts },
    Video { pts: Pts, marker: u8 },
    Audio { pts: Pts, bytes: usize },
    TrackFinished { track: TrackKind },
    Finalized,
    FinalizeFailed,
}

/**
    Scripted behaviour for a [`ManifestSink`].
*/
#[derive(Clone, Debug, Default)]
pub struct SinkScript {
    /// Readiness polls answered "not ready" after every video append.
    pub video_stall_polls: u32,
    /// Readiness polls answered "not ready" after every audio append.
    pub audio_stall_polls: u32,
    /// Video readiness polls answered "not ready" before the first append.
    pub initial_video_stall_polls: u32,
    /// Number of appended video buffers held before being dropped.
    pub held_buffers: usize,
    /// Sleep before every append.
    pub append_delay: Duration,
    /// Fail the video append with this index.
    pub fail_video_append_at: Option<usize>,
    /// Fail the flush in `finalize`.
    pub fail_finalize: bool,
}

/**
    Shared, inspectable record of the calls made on one sink.
*/
#[derive(Clone, Debug, Default)]
pub struct SinkLog {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl SinkLog {
    fn push(&self, event: SinkEvent) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /**
        Timestamps of appended video buffers, in append order.
    */
    pub fn video_pts(&self) -> Vec<Pts> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Video { pts, .. } => Some(*pts),
                _ => None,
            })
            .collect()
    }

    /**
        First byte of every appended video buffer, in append order.
    */
    pub fn video_markers(&self) -> Vec<u8> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Video { marker, .. } => Some(*marker),
                _ => None,
            })
            .collect()
    }

    /**
        Timestamps of appended audio samples, in append order.
    */
    pub fn audio_pts(&self) -> Vec<Pts> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Audio { pts, .. } => Some(*pts),
                _ => None,
            })
            .collect()
    }

    pub fn session_start(&self) -> Option<Pts> {
        self.events.lock().iter().find_map(|e| match e {
            SinkEvent::SessionStarted { at } => Some(*at),
            _ => None,
        })
    }

    pub fn finalize_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Finalized | SinkEvent::FinalizeFailed))
            .count()
    }

    /**
        Position of the first event matching `predicate`.
    */
    pub fn position(&self, predicate: impl Fn(&SinkEvent) -> bool) -> Option<usize> {
        self.events.lock().iter().position(predicate)
    }
}

/**
    The JSON document a [`ManifestSink`] writes on finalize.
*/
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkManifest {
    pub container: ContainerFormat,
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
    /// Display transform as `[a, b, c, d, tx, ty]`.
    pub transform: [f64; 6],
    pub audio_codec: Option<String>,
    pub session_start: Option<i64>,
    pub video_pts: Vec<i64>,
    pub video_markers: Vec<u8>,
    pub audio_pts: Vec<i64>,
}

impl SinkManifest {
    /**
        Read a manifest written by a [`ManifestSink`].
    */
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(|e| Error::invalid_data(e.to_string()))
    }
}

/**
    A sink that writes a JSON description of the appended samples instead
    of encoding them.
*/
pub struct ManifestSink {
    path: PathBuf,
    script: SinkScript,
    log: SinkLog,
    manifest: SinkManifest,
    expected: media_types::Geometry,
    started: bool,
    video_finished: bool,
    audio_finished: bool,
    video_stall: u32,
    audio_stall: u32,
    held: VecDeque<Box<dyn FrameBuffer>>,
}

impl ManifestSink {
    pub fn new(path: &Path, config: &SinkConfig, script: SinkScript, log: SinkLog) -> Result<Self> {
        let video = config
            .video
            .as_ref()
            .ok_or_else(|| Error::invalid_data("sink config has no video track"))?;
        let t = video.transform;

        let manifest = SinkManifest {
            container: config.format,
            width: video.width,
            height: video.height,
            bitrate: video.bitrate,
            transform: [t.a, t.b, t.c, t.d, t.tx, t.ty],
            audio_codec: config.audio.as_ref().map(|a| format!("{:?}", a.codec)),
            ..SinkManifest::default()
        };

        let video_stall = script.initial_video_stall_polls;
        Ok(Self {
            path: path.to_path_buf(),
            script,
            log,
            manifest,
            expected: video.geometry(),
            started: false,
            video_finished: false,
            // No audio track means there is nothing to wait for
            audio_finished: config.audio.is_none(),
            video_stall,
            audio_stall: 0,
            held: VecDeque::new(),
        })
    }

    pub fn log(&self) -> &SinkLog {
        &self.log
    }

    fn check_append(&self, track: TrackKind, finished: bool, stall: u32) -> Result<()> {
        if !self.started {
            return Err(Error::invalid_data(format!(
                "{} append before start_session",
                track.name()
            )));
        }
        if finished {
            return Err(Error::invalid_data(format!(
                "{} append after the track was finished",
                track.name()
            )));
        }
        if stall > 0 {
            return Err(Error::invalid_data(format!(
                "{} append while not ready for more data",
                track.name()
            )));
        }
        Ok(())
    }

    fn write_manifest(&self) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(&mut writer, &self.manifest)?;
        writer.flush()
    }
}

impl FrameSink for ManifestSink {
    fn start_session(&mut self, at: Pts) -> Result<()> {
        if self.started {
            return Err(Error::invalid_data("session already started"));
        }
        self.started = true;
        self.manifest.session_start = Some(at.0);
        self.log.push(SinkEvent::SessionStarted { at });
        Ok(())
    }

    fn is_ready_for_more_data(&mut self, track: TrackKind) -> bool {
        let (finished, stall) = match track {
            TrackKind::Video => (self.video_finished, &mut self.video_stall),
            TrackKind::Audio => (self.audio_finished, &mut self.audio_stall),
        };
        if finished {
            return false;
        }
        if *stall > 0 {
            *stall -= 1;
            return false;
        }
        true
    }

    fn append_video(&mut self, buffer: Box<dyn FrameBuffer>, pts: Pts) -> Result<()> {
        self.check_append(TrackKind::Video, self.video_finished, self.video_stall)?;
        if buffer.geometry() != self.expected {
            return Err(Error::invalid_data(format!(
                "buffer geometry {:?} does not match track geometry {:?}",
                buffer.geometry(),
                self.expected
            )));
        }
        if !self.script.append_delay.is_zero() {
            thread::sleep(self.script.append_delay);
        }
        let index = self.manifest.video_pts.len();
        if self.script.fail_video_append_at == Some(index) {
            return Err(Error::mux(format!("scripted append failure at frame {index}")));
        }

        let marker = buffer.data().first().copied().unwrap_or(0);
        trace!(pts = pts.0, marker, "video append");
        self.manifest.video_pts.push(pts.0);
        self.manifest.video_markers.push(marker);
        self.log.push(SinkEvent::Video { pts, marker });

        self.held.push_back(buffer);
        while self.held.len() > self.script.held_buffers {
            self.held.pop_front();
        }
        self.video_stall = self.script.video_stall_polls;
        Ok(())
    }

    fn append_audio(&mut self, sample: AudioSample, pts: Pts) -> Result<()> {
        self.check_append(TrackKind::Audio, self.audio_finished, self.audio_stall)?;
        if !self.script.append_delay.is_zero() {
            thread::sleep(self.script.append_delay);
        }
        self.manifest.audio_pts.push(pts.0);
        self.log.push(SinkEvent::Audio {
            pts,
            bytes: sample.data.len(),
        });
        self.audio_stall = self.script.audio_stall_polls;
        Ok(())
    }

    fn mark_track_finished(&mut self, track: TrackKind) {
        let finished = match track {
            TrackKind::Video => &mut self.video_finished,
            TrackKind::Audio => &mut self.audio_finished,
        };
        if !*finished {
            *finished = true;
            self.log.push(SinkEvent::TrackFinished { track });
        }
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        self.held.clear();

        if !self.video_finished || !self.audio_finished {
            self.log.push(SinkEvent::FinalizeFailed);
            return Err(Error::mux("finalize called before every track finished"));
        }
        if self.script.fail_finalize {
            self.log.push(SinkEvent::FinalizeFailed);
            return Err(Error::mux("scripted flush failure"));
        }
        if let Err(e) = self.write_manifest() {
            self.log.push(SinkEvent::FinalizeFailed);
            return Err(Error::mux(format!("{}: {e}", self.path.display())));
        }

        debug!(
            path = %self.path.display(),
            video = self.manifest.video_pts.len(),
            audio = self.manifest.audio_pts.len(),
            "manifest written"
        );
        self.log.push(SinkEvent::Finalized);
        Ok(())
    }
}

/**
    Creates [`ManifestSink`]s and keeps a handle to each one's log.
*/
#[derive(Clone, Debug, Default)]
pub struct ManifestSinkFactory {
    script: SinkScript,
    logs: Arc<Mutex<Vec<SinkLog>>>,
}

impl ManifestSinkFactory {
    pub fn new(script: SinkScript) -> Self {
        Self {
            script,
            logs: Arc::default(),
        }
    }

    /**
        Logs of every sink created so far, oldest first.
    */
    pub fn logs(&self) -> Vec<SinkLog> {
        self.logs.lock().clone()
    }

    pub fn last_log(&self) -> Option<SinkLog> {
        self.logs.lock().last().cloned()
    }

    pub fn created(&self) -> usize {
        self.logs.lock().len()
    }
}

impl SinkFactory for ManifestSinkFactory {
    fn create(&self, path: &Path, config: &SinkConfig) -> Result<Box<dyn FrameSink>> {
        let log = SinkLog::default();
        let sink = ManifestSink::new(path, config, self.script.clone(), log.clone())?;
        self.logs.lock().push(log);
        Ok(Box::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VideoSettings;
    use media_types::{
        DisplayTransform, Geometry, MediaDuration, PixelFormat, Rational, VideoFrame,
    };

    const TB: Rational = Rational { num: 1, den: 600 };

    fn config(with_audio: bool) -> SinkConfig {
        let video = VideoSettings {
            codec: media_types::CodecId::H264,
            width: 2,
            height: 2,
            pixel_format: PixelFormat::Bgra,
            bitrate: 1000,
            frame_rate: Rational::new(30, 1),
            time_base: TB,
            transform: DisplayTransform::IDENTITY,
        };
        let audio = with_audio.then(|| media_types::AudioTrackInfo {
            codec: media_types::CodecId::Aac,
            channels: 2,
            sample_rate: 44_100,
            time_base: Rational::new(1, 44_100),
            bitrate: None,
            frame_size: 1024,
            extradata: Vec::new(),
        });
        SinkConfig::quicktime()
            .with_video(video)
            .with_optional_audio(audio)
    }

    fn frame(marker: u8) -> Box<dyn FrameBuffer> {
        let geometry = Geometry::new(2, 2, PixelFormat::Bgra);
        Box::new(VideoFrame::filled(geometry, &[marker, 0, 0, 255], Pts(0), TB))
    }

    fn audio() -> AudioSample {
        AudioSample::new(vec![1, 2, 3], Pts(0), MediaDuration(1024), Rational::new(1, 44_100))
    }

    #[test]
    fn writes_manifest_on_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mov");
        let factory = ManifestSinkFactory::default();
        let mut sink = factory.create(&path, &config(true)).unwrap();

        sink.start_session(Pts(0)).unwrap();
        sink.append_video(frame(7), Pts(0)).unwrap();
        sink.append_audio(audio(), Pts(0)).unwrap();
        sink.append_video(frame(8), Pts(20)).unwrap();
        sink.mark_track_finished(TrackKind::Video);
        sink.mark_track_finished(TrackKind::Audio);
        sink.finalize().unwrap();

        let manifest = SinkManifest::read(&path).unwrap();
        assert_eq!(manifest.video_pts, vec![0, 20]);
        assert_eq!(manifest.video_markers, vec![7, 8]);
        assert_eq!(manifest.audio_pts, vec![0]);
        assert_eq!(manifest.session_start, Some(0));
        assert_eq!(manifest.audio_codec.as_deref(), Some("Aac"));
        assert_eq!(factory.last_log().unwrap().finalize_count(), 1);
    }

    #[test]
    fn finalize_requires_both_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ManifestSinkFactory::default()
            .create(&dir.path().join("out.mov"), &config(true))
            .unwrap();
        sink.start_session(Pts(0)).unwrap();
        sink.mark_track_finished(TrackKind::Video);
        let err = sink.finalize().unwrap_err();
        assert!(matches!(err, Error::MuxFailed { .. }));
    }

    #[test]
    fn video_only_needs_no_audio_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ManifestSinkFactory::default()
            .create(&dir.path().join("out.mov"), &config(false))
            .unwrap();
        sink.start_session(Pts(0)).unwrap();
        sink.append_video(frame(1), Pts(0)).unwrap();
        sink.mark_track_finished(TrackKind::Video);
        sink.finalize().unwrap();
    }

    #[test]
    fn mark_finished_is_idempotent() {
        let factory = ManifestSinkFactory::default();
        let mut sink = factory.create(Path::new("unused.mov"), &config(true)).unwrap();
        sink.mark_track_finished(TrackKind::Audio);
        sink.mark_track_finished(TrackKind::Audio);
        let log = factory.last_log().unwrap();
        assert_eq!(log.events(), vec![SinkEvent::TrackFinished { track: TrackKind::Audio }]);
        assert!(!sink.is_ready_for_more_data(TrackKind::Audio));
    }

    #[test]
    fn stalls_after_append() {
        let script = SinkScript {
            video_stall_polls: 2,
            ..SinkScript::default()
        };
        let mut sink = ManifestSinkFactory::new(script)
            .create(Path::new("unused.mov"), &config(false))
            .unwrap();
        sink.start_session(Pts(0)).unwrap();
        assert!(sink.is_ready_for_more_data(TrackKind::Video));
        sink.append_video(frame(0), Pts(0)).unwrap();

        // Appending while stalled is rejected
        assert!(sink.append_video(frame(1), Pts(20)).is_err());
        assert!(!sink.is_ready_for_more_data(TrackKind::Video));
        assert!(!sink.is_ready_for_more_data(TrackKind::Video));
        assert!(sink.is_ready_for_more_data(TrackKind::Video));
        sink.append_video(frame(1), Pts(20)).unwrap();
    }

    #[test]
    fn initial_stall_delays_first_video() {
        let script = SinkScript {
            initial_video_stall_polls: 1,
            ..SinkScript::default()
        };
        let mut sink = ManifestSinkFactory::new(script)
            .create(Path::new("unused.mov"), &config(false))
            .unwrap();
        sink.start_session(Pts(0)).unwrap();
        assert!(!sink.is_ready_for_more_data(TrackKind::Video));
        assert!(sink.is_ready_for_more_data(TrackKind::Video));
        sink.append_video(frame(0), Pts(0)).unwrap();
    }

    #[test]
    fn append_before_start_is_rejected() {
        let mut sink = ManifestSinkFactory::default()
            .create(Path::new("unused.mov"), &config(false))
            .unwrap();
        let err = sink.append_video(frame(0), Pts(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[test]
    fn wrong_geometry_is_rejected() {
        let mut sink = ManifestSinkFactory::default()
            .create(Path::new("unused.mov"), &config(false))
            .unwrap();
        sink.start_session(Pts(0)).unwrap();
        let big = VideoFrame::filled(
            Geometry::new(4, 4, PixelFormat::Bgra),
            &[0, 0, 0, 255],
            Pts(0),
            TB,
        );
        assert!(sink.append_video(Box::new(big), Pts(0)).is_err());
    }

    #[test]
    fn scripted_flush_failure() {
        let script = SinkScript {
            fail_finalize: true,
            ..SinkScript::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mov");
        let mut sink = ManifestSinkFactory::new(script).create(&path, &config(false)).unwrap();
        sink.start_session(Pts(0)).unwrap();
        sink.mark_track_finished(TrackKind::Video);
        let err = sink.finalize().unwrap_err();
        assert_eq!(err.to_string(), "mux failed: scripted flush failure");
        assert!(!path.exists());
    }
}
