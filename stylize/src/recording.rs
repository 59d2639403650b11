/*!
    Live recording from a capture feed.

    Capture threads hand frames and samples to a [`RecordingSession`]
    without ever blocking on the style transform. A single worker thread
    transforms one frame at a time; a frame that arrives while the worker
    is busy is dropped rather than queued, so preview and recording stay
    close to real time even with a transform slower than the camera.

    Frames are transformed and previewed whether or not a recording is in
    progress. While recording, timestamps are rebased so the first frame
    written lands at zero, and audio that predates that frame is dropped.
*/

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use media_sink::{SinkConfig, SinkFactory, VideoSettings};
use media_transform::{OrientationPlan, StyleTransform};
use media_types::{AudioSample, Error, MediaAsset, Result, Sample, TrackKind, VideoFrame};

use crate::{
    config::PipelineConfig,
    output::PartialOutput,
    pool::BufferPool,
    session::{WriterSession, WriterState},
    stage::{StyledFrame, VideoStage},
};

type FrameCallback = Box<dyn FnMut(&VideoFrame) + Send>;
type StillCallback = Box<dyn FnMut(VideoFrame) + Send>;

/**
    Whether a [`RecordingSession`] is currently writing a file.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    Stopped,
    Recording,
}

/**
    Counters accumulated over the lifetime of a [`RecordingSession`].
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordingStats {
    /// Video frames handed to the session.
    pub frames_submitted: u64,
    /// Frames that went through the transform.
    pub frames_processed: u64,
    /// Frames rejected because the previous one was still being transformed.
    pub frames_dropped: u64,
    /// Frames rejected because their pixel data did not match their size.
    pub frames_malformed: u64,
    /// Frames abandoned because processing them panicked.
    pub frames_panicked: u64,
    /// Frames appended to a recording.
    pub frames_written: u64,
    /// Frames transformed while recording but skipped because the sink was busy.
    pub frames_skipped: u64,
    /// Frames written untransformed because the transform failed.
    pub transform_failures: u64,
    /// Audio samples appended to a recording.
    pub audio_written: u64,
    /// Audio samples that arrived before the recording's first frame.
    pub audio_dropped: u64,
}

#[derive(Default)]
struct Counters {
    frames_submitted: AtomicU64,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    frames_malformed: AtomicU64,
    frames_panicked: AtomicU64,
    frames_written: AtomicU64,
    frames_skipped: AtomicU64,
    transform_failures: AtomicU64,
    audio_written: AtomicU64,
    audio_dropped: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RecordingStats {
        RecordingStats {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            frames_panicked: self.frames_panicked.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            audio_written: self.audio_written.load(Ordering::Relaxed),
            audio_dropped: self.audio_dropped.load(Ordering::Relaxed),
        }
    }
}

/**
    The in-flight slot between capture threads and the worker.
*/
#[derive(Default)]
struct Slot {
    frame: Option<VideoFrame>,
    busy: bool,
    shutdown: bool,
}

#[derive(Default)]
struct Callbacks {
    on_frame: Option<FrameCallback>,
    on_still: Option<StillCallback>,
}

/**
    One recording, from `start` to `stop`.
*/
struct Recording {
    session: WriterSession,
    partial: Mutex<Option<PartialOutput>>,
    /// Capture time of the first frame appended, set once that append succeeds.
    origin: Mutex<Option<Duration>>,
}

struct Shared {
    sinks: Arc<dyn SinkFactory>,
    sink_config: SinkConfig,
    config: PipelineConfig,
    pool: BufferPool,
    slot: Mutex<Slot>,
    slot_changed: Condvar,
    active: Mutex<Option<Arc<Recording>>>,
    still_requested: AtomicBool,
    callbacks: Mutex<Callbacks>,
    counters: Counters,
}

/**
    Style transfer over a live capture feed, with start/stop recording.

    ```ignore
    let session = RecordingSession::new(camera_format, Box::new(model), FileSinkFactory, config);
    session.set_on_frame(|frame| preview.show(frame));

    session.start("clip.mov")?;
    // capture threads call session.submit_video(frame) / submit_audio(sample)
    let path = session.stop()?;
    ```
*/
pub struct RecordingSession {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl RecordingSession {
    /**
        Create a session for a capture feed described by `format` and start
        its transform worker. Nothing is recorded until [`start`].

        [`start`]: RecordingSession::start
    */
    pub fn new(
        format: MediaAsset,
        transform: Box<dyn StyleTransform>,
        sinks: impl SinkFactory + 'static,
        config: PipelineConfig,
    ) -> Self {
        let plan = OrientationPlan::resolve(&format.video, config.rotation_policy);
        let mut settings = VideoSettings::for_track(
            &format.video,
            plan.output_width,
            plan.output_height,
            plan.output_transform,
        );
        if let Some(bitrate) = config.video_bitrate {
            settings = settings.with_bitrate(bitrate);
        }
        let sink_config = SinkConfig::new(config.container)
            .with_video(settings)
            .with_optional_audio(format.audio.clone())
            .with_fast_start(config.fast_start);

        let pool = BufferPool::new(config.pool_capacity);
        let shared = Arc::new(Shared {
            sinks: Arc::new(sinks),
            sink_config,
            config,
            pool: pool.clone(),
            slot: Mutex::new(Slot::default()),
            slot_changed: Condvar::new(),
            active: Mutex::new(None),
            still_requested: AtomicBool::new(false),
            callbacks: Mutex::new(Callbacks::default()),
            counters: Counters::default(),
        });

        let stage = VideoStage::new(plan, transform, pool);
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || run_worker(shared, stage))
        };

        debug!(
            width = format.video.width,
            height = format.video.height,
            rotation = plan.source_rotation.degrees(),
            audio = format.has_audio(),
            "recording session ready"
        );

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /**
        Called on the worker thread with every transformed frame, recording
        or not.
    */
    pub fn set_on_frame(&self, callback: impl FnMut(&VideoFrame) + Send + 'static) {
        self.shared.callbacks.lock().on_frame = Some(Box::new(callback));
    }

    /**
        Called on the worker thread with the frame that satisfied a
        [`capture_still`](RecordingSession::capture_still) request.
    */
    pub fn set_on_still(&self, callback: impl FnMut(VideoFrame) + Send + 'static) {
        self.shared.callbacks.lock().on_still = Some(Box::new(callback));
    }

    pub fn state(&self) -> RecordingState {
        if self.shared.active.lock().is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Stopped
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    pub fn stats(&self) -> RecordingStats {
        self.shared.counters.snapshot()
    }

    /**
        Begin recording to `destination`.

        The file is written under a temporary name next to `destination`
        and only moved into place by a successful [`stop`].

        [`stop`]: RecordingSession::stop
    */
    pub fn start(&self, destination: impl AsRef<Path>) -> Result<()> {
        let destination = destination.as_ref();
        let mut active = self.shared.active.lock();
        if active.is_some() {
            return Err(Error::invalid_data("already recording"));
        }

        let partial = PartialOutput::create(destination)?;
        let sink = self
            .shared
            .sinks
            .create(partial.path(), &self.shared.sink_config)?;
        let session = WriterSession::new(
            sink,
            self.shared.sink_config.has_audio(),
            self.shared.config.poll_interval(),
        );

        *active = Some(Arc::new(Recording {
            session,
            partial: Mutex::new(Some(partial)),
            origin: Mutex::new(None),
        }));
        info!(destination = %destination.display(), "recording started");
        Ok(())
    }

    /**
        Finish the current recording and return the path of the finished
        file, or `None` if nothing was being recorded.

        A frame still being transformed when this is called is not part of
        the recording. Fails with [`Error::NothingWritten`] if no frame was
        recorded, in which case no file is left behind.
    */
    pub fn stop(&self) -> Result<Option<PathBuf>> {
        let Some(recording) = self.shared.active.lock().take() else {
            return Ok(None);
        };
        let partial = recording.partial.lock().take();

        let finished = recording
            .session
            .mark_finished(TrackKind::Video)
            .and_then(|_| recording.session.mark_finished(TrackKind::Audio));
        self.shared.pool.drain();
        finished?;

        let state = recording.session.state();
        if state != WriterState::Finished {
            return Err(Error::invalid_data(format!(
                "recording ended as {state:?}"
            )));
        }
        let partial = partial.ok_or_else(|| Error::invalid_data("recording output missing"))?;
        let path = partial.persist()?;

        let stats = self.stats();
        info!(
            path = %path.display(),
            frames = recording.session.video_appended(),
            audio = recording.session.audio_appended(),
            dropped = stats.frames_dropped,
            "recording finished"
        );
        Ok(Some(path))
    }

    /**
        Deliver the next transformed frame to the still callback as well.
    */
    pub fn capture_still(&self) {
        self.shared.still_requested.store(true, Ordering::Release);
    }

    /**
        Hand a captured frame to the transform worker.

        Never blocks on the transform. Returns false if the frame was
        dropped because the previous frame is still being processed, or
        rejected because its pixel data does not match its size.
    */
    pub fn submit_video(&self, frame: VideoFrame) -> bool {
        let shared = &self.shared;
        Counters::bump(&shared.counters.frames_submitted);
        if !frame.is_well_formed() {
            Counters::bump(&shared.counters.frames_malformed);
            warn!(
                pts = frame.pts.0,
                bytes = frame.data.len(),
                expected = frame.geometry().byte_len(),
                "malformed frame rejected"
            );
            return false;
        }

        let mut slot = shared.slot.lock();
        if slot.shutdown {
            return false;
        }
        if slot.busy {
            Counters::bump(&shared.counters.frames_dropped);
            if shared.config.log_dropped_frames {
                debug!(pts = frame.pts.0, "transform busy, frame dropped");
            }
            return false;
        }
        slot.busy = true;
        slot.frame = Some(frame);
        shared.slot_changed.notify_all();
        true
    }

    /**
        Append a captured audio sample to the current recording.

        Returns false if the sample was not written: no recording is in
        progress, no frame has been recorded yet, or the sink is busy.
        Never waits for a video append in progress.
    */
    pub fn submit_audio(&self, sample: AudioSample) -> bool {
        let shared = &self.shared;
        let Some(recording) = shared.current() else {
            return false;
        };
        let Some(origin) = *recording.origin.lock() else {
            Counters::bump(&shared.counters.audio_dropped);
            trace!(pts = sample.pts.0, "audio before first frame dropped");
            return false;
        };
        let Some(pts) = sample.pts.rebase(origin, sample.time_base) else {
            Counters::bump(&shared.counters.audio_dropped);
            trace!(pts = sample.pts.0, "audio before first frame dropped");
            return false;
        };

        match recording.session.try_append_audio(sample.restamped(pts), pts) {
            Ok(true) => {
                Counters::bump(&shared.counters.audio_written);
                true
            }
            Ok(false) => {
                Counters::bump(&shared.counters.audio_dropped);
                false
            }
            Err(e) => {
                shared.append_failed(&recording, TrackKind::Audio, e);
                false
            }
        }
    }

    /**
        Route a captured sample to [`submit_video`] or [`submit_audio`].

        [`submit_video`]: RecordingSession::submit_video
        [`submit_audio`]: RecordingSession::submit_audio
    */
    pub fn submit(&self, sample: Sample) -> bool {
        match sample {
            Sample::Video(frame) => self.submit_video(frame),
            Sample::Audio(sample) => self.submit_audio(sample),
        }
    }

    /**
        Block until the worker has no frame in flight, or `timeout` passes.
        Returns true if the worker is idle.
    */
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        while slot.busy {
            if self
                .shared
                .slot_changed
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                return !slot.busy;
            }
        }
        true
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        {
            let mut slot = self.shared.slot.lock();
            slot.shutdown = true;
            self.shared.slot_changed.notify_all();
        }
        self.shared.pool.close();

        if let Some(recording) = self.shared.active.lock().take() {
            warn!("recording session dropped while recording, discarding output");
            recording.session.abort();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Shared {
    fn current(&self) -> Option<Arc<Recording>> {
        self.active.lock().clone()
    }

    fn is_current(&self, recording: &Arc<Recording>) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, recording))
    }

    fn append_failed(&self, recording: &Arc<Recording>, track: TrackKind, error: Error) {
        if self.is_current(recording) {
            error!(track = track.name(), error = %error, "recording append failed");
        } else {
            trace!(track = track.name(), "append raced with stop, ignored");
        }
    }

    fn deliver(&self, styled: &StyledFrame) {
        let mut callbacks = self.callbacks.lock();
        if let Some(on_frame) = callbacks.on_frame.as_mut() {
            on_frame(styled.output());
        }
        if self.still_requested.swap(false, Ordering::AcqRel) {
            match callbacks.on_still.as_mut() {
                Some(on_still) => on_still(styled.output().clone()),
                None => debug!("still requested without a still callback"),
            }
        }
    }

    fn process(&self, stage: &mut VideoStage, frame: VideoFrame) {
        let time = frame.presentation_time();
        let time_base = frame.time_base;

        let styled = match stage.stylize(frame) {
            Ok(styled) => styled,
            Err(e) => {
                Counters::bump(&self.counters.frames_malformed);
                warn!(error = %e, "frame could not be processed");
                return;
            }
        };
        Counters::bump(&self.counters.frames_processed);
        self.counters
            .transform_failures
            .store(stage.transform_failures(), Ordering::Relaxed);
        self.deliver(&styled);

        let Some(recording) = self.current() else {
            return;
        };
        // Until a frame is recorded, each frame is a candidate origin
        let origin = recording.origin.lock().unwrap_or(time);
        let Some(pts) = styled.pts.rebase(origin, time_base) else {
            Counters::bump(&self.counters.frames_skipped);
            return;
        };

        let buffer = match stage.render(&styled) {
            Ok(buffer) => buffer,
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                warn!(pts = styled.pts.0, error = %e, "could not render frame");
                Counters::bump(&self.counters.frames_skipped);
                return;
            }
        };

        match recording.session.try_append_video(Box::new(buffer), pts) {
            Ok(true) => {
                recording.origin.lock().get_or_insert(origin);
                Counters::bump(&self.counters.frames_written);
                trace!(pts = pts.0, "frame recorded");
            }
            Ok(false) => {
                Counters::bump(&self.counters.frames_skipped);
                if self.config.log_dropped_frames {
                    debug!(pts = pts.0, "sink busy, frame skipped");
                }
            }
            Err(e) => self.append_failed(&recording, TrackKind::Video, e),
        }
    }
}

fn run_worker(shared: Arc<Shared>, mut stage: VideoStage) {
    loop {
        let frame = {
            let mut slot = shared.slot.lock();
            loop {
                if slot.shutdown {
                    return;
                }
                if let Some(frame) = slot.frame.take() {
                    break frame;
                }
                shared.slot_changed.wait(&mut slot);
            }
        };

        let pts = frame.pts;
        let processed =
            panic::catch_unwind(AssertUnwindSafe(|| shared.process(&mut stage, frame)));
        if processed.is_err() {
            Counters::bump(&shared.counters.frames_panicked);
            error!(pts = pts.0, "frame processing panicked, frame abandoned");
        }

        let mut slot = shared.slot.lock();
        slot.busy = false;
        shared.slot_changed.notify_all();
    }
}

static_assertions::assert_impl_all!(RecordingSession: Send, Sync);
