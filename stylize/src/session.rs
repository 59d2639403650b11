/*!
    Writer session: the sink, its lifecycle state and the completion barrier.
*/

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use media_sink::{FrameBuffer, FrameSink};
use media_types::{AudioSample, Error, Pts, Result, TrackKind};

/**
    Lifecycle of a [`WriterSession`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    /// Sink created, nothing appended yet.
    Idle,
    /// Session started, appends accepted.
    Writing,
    /// Both tracks finished, the sink is being flushed.
    Finishing,
    /// The sink was flushed successfully.
    Finished,
    /// The session was aborted or the sink failed.
    Failed,
}

impl WriterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

/**
    What a call to [`WriterSession::mark_finished`] did.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The other track is still running.
    Pending,
    /// This call saw both tracks finished and flushed the sink.
    Finalized,
}

/**
    Owns a sink for the duration of one output file.

    The sink, the lifecycle state and both track-finished flags live behind
    a single mutex. Whichever lane marks its track finished last performs
    the flush while still holding that lock, so the sink is finalized
    exactly once and only after both tracks are done.

    The session starts lazily: the first accepted append starts the sink
    at [`Pts::ZERO`].
*/
pub struct WriterSession {
    inner: Mutex<SessionInner>,
    changed: Condvar,
    poll_interval: Duration,
}

struct SessionInner {
    state: WriterState,
    sink: Option<Box<dyn FrameSink>>,
    video_finished: bool,
    audio_finished: bool,
    video_appended: u64,
    audio_appended: u64,
    failure: Option<String>,
}

impl WriterSession {
    /**
        Wrap `sink`. A sink without an audio track has its audio track
        marked finished immediately.
    */
    pub fn new(mut sink: Box<dyn FrameSink>, has_audio: bool, poll_interval: Duration) -> Self {
        if !has_audio {
            sink.mark_track_finished(TrackKind::Audio);
        }
        Self {
            inner: Mutex::new(SessionInner {
                state: WriterState::Idle,
                sink: Some(sink),
                video_finished: false,
                audio_finished: !has_audio,
                video_appended: 0,
                audio_appended: 0,
                failure: None,
            }),
            changed: Condvar::new(),
            poll_interval,
        }
    }

    pub fn state(&self) -> WriterState {
        self.inner.lock().state
    }

    pub fn video_appended(&self) -> u64 {
        self.inner.lock().video_appended
    }

    pub fn audio_appended(&self) -> u64 {
        self.inner.lock().audio_appended
    }

    pub fn is_track_finished(&self, track: TrackKind) -> bool {
        let inner = self.inner.lock();
        match track {
            TrackKind::Video => inner.video_finished,
            TrackKind::Audio => inner.audio_finished,
        }
    }

    /**
        Block until the sink can take more data on `track`.

        The sink is polled at the session's poll interval, or sooner when
        another lane changes the session. Fails with [`Error::Cancelled`]
        once `stop` is set or the session has been aborted.
    */
    pub fn wait_until_ready(&self, track: TrackKind, stop: &AtomicBool) -> Result<()> {
        let mut inner = self.inner.lock();
        loop {
            if stop.load(Ordering::Acquire) {
                return Err(Error::Cancelled);
            }
            inner.check_accepting()?;
            if let Some(sink) = inner.sink.as_mut() {
                if sink.is_ready_for_more_data(track) {
                    return Ok(());
                }
            }
            self.changed.wait_for(&mut inner, self.poll_interval);
        }
    }

    /**
        Append a video buffer if the sink is ready for it right now.

        Returns `Ok(false)` without appending when the sink is busy; the
        buffer is dropped in that case.
    */
    pub fn try_append_video(&self, buffer: Box<dyn FrameBuffer>, pts: Pts) -> Result<bool> {
        let mut inner = self.inner.lock();
        inner.check_accepting()?;
        let ready = inner
            .sink
            .as_mut()
            .is_some_and(|sink| sink.is_ready_for_more_data(TrackKind::Video));
        if !ready {
            return Ok(false);
        }
        inner.append_video(buffer, pts)?;
        self.changed.notify_all();
        Ok(true)
    }

    /**
        Append a video buffer. The caller must have seen the video track
        ready since its last append.
    */
    pub fn append_video(&self, buffer: Box<dyn FrameBuffer>, pts: Pts) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_accepting()?;
        inner.append_video(buffer, pts)?;
        self.changed.notify_all();
        Ok(())
    }

    /**
        Append an audio sample if the sink is ready for it right now.

        Never waits for the session lock: while another thread is appending
        video, this returns `Ok(false)` and the sample is dropped.
    */
    pub fn try_append_audio(&self, sample: AudioSample, pts: Pts) -> Result<bool> {
        let Some(mut inner) = self.inner.try_lock() else {
            return Ok(false);
        };
        inner.check_accepting()?;
        let ready = inner
            .sink
            .as_mut()
            .is_some_and(|sink| sink.is_ready_for_more_data(TrackKind::Audio));
        if !ready {
            return Ok(false);
        }
        inner.append_audio(sample, pts)?;
        self.changed.notify_all();
        Ok(true)
    }

    /**
        Append an audio sample. The caller must have seen the audio track
        ready since its last append.
    */
    pub fn append_audio(&self, sample: AudioSample, pts: Pts) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_accepting()?;
        inner.append_audio(sample, pts)?;
        self.changed.notify_all();
        Ok(())
    }

    /**
        Mark `track` finished, finalizing the sink if the other track
        already is.

        Marking a track twice has no further effect. If both tracks finish
        without a single video frame having been appended, the sink is
        discarded and [`Error::NothingWritten`] returned instead.
    */
    pub fn mark_finished(&self, track: TrackKind) -> Result<Completion> {
        let mut inner = self.inner.lock();
        let result = inner.mark_finished(track);
        self.changed.notify_all();
        result
    }

    /**
        Abandon the session without finalizing. The sink is dropped and
        every subsequent call fails with [`Error::Cancelled`].
    */
    pub fn abort(&self) {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminal() {
            debug!(state = ?inner.state, "writer session aborted");
            inner.state = WriterState::Failed;
            inner.sink = None;
        }
        self.changed.notify_all();
    }
}

impl SessionInner {
    fn check_accepting(&self) -> Result<()> {
        match self.state {
            WriterState::Idle | WriterState::Writing => Ok(()),
            WriterState::Failed => Err(self.failure_error()),
            WriterState::Finishing | WriterState::Finished => Err(Error::Cancelled),
        }
    }

    fn failure_error(&self) -> Error {
        match &self.failure {
            Some(message) => Error::mux(message.clone()),
            None => Error::Cancelled,
        }
    }

    fn sink(&mut self) -> Result<&mut Box<dyn FrameSink>> {
        self.sink.as_mut().ok_or(Error::Cancelled)
    }

    fn ensure_started(&mut self) -> Result<()> {
        if self.state != WriterState::Idle {
            return Ok(());
        }
        if let Err(e) = self.sink()?.start_session(Pts::ZERO) {
            return Err(self.fail(e));
        }
        self.state = WriterState::Writing;
        debug!("writer session started");
        Ok(())
    }

    fn append_video(&mut self, buffer: Box<dyn FrameBuffer>, pts: Pts) -> Result<()> {
        if self.video_finished {
            return Err(Error::invalid_data("video append after the track finished"));
        }
        self.ensure_started()?;
        if let Err(e) = self.sink()?.append_video(buffer, pts) {
            return Err(self.fail(e));
        }
        self.video_appended += 1;
        Ok(())
    }

    fn append_audio(&mut self, sample: AudioSample, pts: Pts) -> Result<()> {
        if self.audio_finished {
            return Err(Error::invalid_data("audio append after the track finished"));
        }
        self.ensure_started()?;
        if let Err(e) = self.sink()?.append_audio(sample, pts) {
            return Err(self.fail(e));
        }
        self.audio_appended += 1;
        Ok(())
    }

    fn mark_finished(&mut self, track: TrackKind) -> Result<Completion> {
        let flag = match track {
            TrackKind::Video => &mut self.video_finished,
            TrackKind::Audio => &mut self.audio_finished,
        };
        let newly = !*flag;
        *flag = true;

        match self.state {
            WriterState::Finished => return Ok(Completion::Pending),
            WriterState::Failed => return Err(self.failure_error()),
            _ => {}
        }

        if newly {
            if let Some(sink) = self.sink.as_mut() {
                sink.mark_track_finished(track);
            }
            debug!(track = track.name(), "track finished");
        }
        if !(self.video_finished && self.audio_finished) {
            return Ok(Completion::Pending);
        }

        if self.video_appended == 0 {
            warn!("no video frames were written, discarding output");
            self.state = WriterState::Failed;
            self.sink = None;
            return Err(Error::NothingWritten);
        }

        self.state = WriterState::Finishing;
        let sink = self.sink.take().ok_or(Error::Cancelled)?;
        match sink.finalize() {
            Ok(()) => {
                self.state = WriterState::Finished;
                debug!(
                    video = self.video_appended,
                    audio = self.audio_appended,
                    "writer session finalized"
                );
                Ok(Completion::Finalized)
            }
            Err(e) => {
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        warn!(error = %error, "sink failed");
        self.state = WriterState::Failed;
        self.failure = Some(match &error {
            Error::MuxFailed { message } => message.clone(),
            other => other.to_string(),
        });
        self.sink = None;
        error
    }
}

static_assertions::assert_impl_all!(WriterSession: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use media_sink::{
        ManifestSink, SinkConfig, SinkEvent, SinkLog, SinkScript, VideoSettings,
    };
    use media_types::{
        AudioTrackInfo, CodecId, DisplayTransform, Geometry, MediaDuration, PixelFormat,
        Rational, VideoFrame, VideoTrackInfo,
    };
    use std::path::Path;

    const TB: Rational = Rational { num: 1, den: 600 };

    fn config(with_audio: bool) -> SinkConfig {
        let track = VideoTrackInfo {
            width: 2,
            height: 2,
            frame_rate: Rational::new(30, 1),
            time_base: TB,
            transform: DisplayTransform::IDENTITY,
            bitrate: None,
            duration: Duration::from_secs(1),
        };
        let audio = AudioTrackInfo {
            codec: CodecId::Aac,
            channels: 2,
            sample_rate: 44_100,
            time_base: Rational::new(1, 44_100),
            bitrate: None,
            frame_size: 1024,
            extradata: Vec::new(),
        };
        SinkConfig::quicktime()
            .with_video(VideoSettings::for_track(&track, 2, 2, DisplayTransform::IDENTITY))
            .with_optional_audio(with_audio.then_some(audio))
    }

    fn session(path: &Path, with_audio: bool, script: SinkScript) -> (WriterSession, SinkLog) {
        let log = SinkLog::default();
        let sink = ManifestSink::new(path, &config(with_audio), script, log.clone()).unwrap();
        let session = WriterSession::new(Box::new(sink), with_audio, Duration::from_millis(1));
        (session, log)
    }

    fn frame(marker: u8, pts: i64) -> Box<dyn FrameBuffer> {
        let geometry = Geometry::new(2, 2, PixelFormat::Bgra);
        Box::new(VideoFrame::filled(geometry, &[marker, 0, 0, 255], Pts(pts), TB))
    }

    fn sample(pts: i64) -> AudioSample {
        AudioSample::new(vec![1, 2, 3], Pts(pts), MediaDuration(1024), Rational::new(1, 44_100))
    }

    #[test]
    fn first_append_starts_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let (session, log) = session(&dir.path().join("out.json"), false, SinkScript::default());
        assert_eq!(session.state(), WriterState::Idle);
        assert!(session.is_track_finished(TrackKind::Audio));

        session.append_video(frame(1, 20), Pts(20)).unwrap();
        assert_eq!(session.state(), WriterState::Writing);
        assert_eq!(log.session_start(), Some(Pts::ZERO));
        assert_eq!(log.video_pts(), vec![Pts(20)]);
    }

    #[test]
    fn finalizes_once_after_both_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let (session, log) = session(&path, true, SinkScript::default());

        session.append_video(frame(1, 0), Pts(0)).unwrap();
        session.append_audio(sample(0), Pts(0)).unwrap();

        assert_eq!(session.mark_finished(TrackKind::Video).unwrap(), Completion::Pending);
        assert_eq!(log.finalize_count(), 0);
        assert_eq!(session.mark_finished(TrackKind::Audio).unwrap(), Completion::Finalized);
        assert_eq!(session.state(), WriterState::Finished);
        assert_eq!(log.finalize_count(), 1);
        assert!(path.exists());

        // Marking again changes nothing
        assert_eq!(session.mark_finished(TrackKind::Audio).unwrap(), Completion::Pending);
        assert_eq!(log.finalize_count(), 1);
    }

    #[test]
    fn no_video_means_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let (session, log) = session(&path, false, SinkScript::default());

        let err = session.mark_finished(TrackKind::Video).unwrap_err();
        assert!(matches!(err, Error::NothingWritten));
        assert_eq!(session.state(), WriterState::Failed);
        assert_eq!(log.finalize_count(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn flush_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let script = SinkScript {
            fail_finalize: true,
            ..SinkScript::default()
        };
        let (session, _log) = session(&dir.path().join("out.json"), false, script);
        session.append_video(frame(1, 0), Pts(0)).unwrap();

        let err = session.mark_finished(TrackKind::Video).unwrap_err();
        assert!(matches!(err, Error::MuxFailed { .. }));
        assert_eq!(session.state(), WriterState::Failed);
    }

    #[test]
    fn append_failure_poisons_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let script = SinkScript {
            fail_video_append_at: Some(1),
            ..SinkScript::default()
        };
        let (session, _log) = session(&dir.path().join("out.json"), true, script);
        session.append_video(frame(1, 0), Pts(0)).unwrap();
        let err = session.append_video(frame(2, 20), Pts(20)).unwrap_err();
        assert!(matches!(err, Error::MuxFailed { .. }));

        // The other lane sees the same failure
        let err = session.append_audio(sample(0), Pts(0)).unwrap_err();
        assert_eq!(err.to_string(), "mux failed: scripted append failure at frame 1");
    }

    #[test]
    fn readiness_waits_out_stalls() {
        let dir = tempfile::tempdir().unwrap();
        let script = SinkScript {
            video_stall_polls: 3,
            ..SinkScript::default()
        };
        let (session, log) = session(&dir.path().join("out.json"), false, script);
        let stop = AtomicBool::new(false);

        session.wait_until_ready(TrackKind::Video, &stop).unwrap();
        session.append_video(frame(1, 0), Pts(0)).unwrap();
        assert!(!session.try_append_video(frame(2, 20), Pts(20)).unwrap());

        session.wait_until_ready(TrackKind::Video, &stop).unwrap();
        session.append_video(frame(3, 40), Pts(40)).unwrap();
        assert_eq!(log.video_markers(), vec![1, 3]);
    }

    #[test]
    fn audio_does_not_wait_behind_a_video_append() {
        let dir = tempfile::tempdir().unwrap();
        let script = SinkScript {
            append_delay: Duration::from_millis(300),
            ..SinkScript::default()
        };
        let (session, log) = session(&dir.path().join("out.json"), true, script);

        std::thread::scope(|scope| {
            let video = scope.spawn(|| session.append_video(frame(1, 0), Pts(0)));
            std::thread::sleep(Duration::from_millis(50));

            let started = std::time::Instant::now();
            assert!(!session.try_append_audio(sample(0), Pts(0)).unwrap());
            assert!(started.elapsed() < Duration::from_millis(200));
            video.join().unwrap().unwrap();
        });

        assert!(session.try_append_audio(sample(1024), Pts(1024)).unwrap());
        assert_eq!(log.audio_pts(), vec![Pts(1024)]);
    }

    #[test]
    fn stop_flag_interrupts_readiness_wait() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _log) = session(&dir.path().join("out.json"), false, SinkScript::default());
        let stop = AtomicBool::new(true);
        let err = session.wait_until_ready(TrackKind::Video, &stop).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn abort_discards_without_finalizing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let (session, log) = session(&path, false, SinkScript::default());
        session.append_video(frame(1, 0), Pts(0)).unwrap();

        session.abort();
        assert_eq!(session.state(), WriterState::Failed);
        assert!(session.append_video(frame(2, 20), Pts(20)).unwrap_err().is_cancelled());
        assert!(session.mark_finished(TrackKind::Video).unwrap_err().is_cancelled());
        assert_eq!(log.finalize_count(), 0);
        assert!(!log.events().contains(&SinkEvent::Finalized));
        assert!(!path.exists());
    }
}
