/*!
    Offline processing of a complete asset.

    A run opens the source, resolves the output orientation, and then drives
    two lanes on their own threads:

    - The video lane pulls decoded frames, rotates them upright if needed,
      runs the style transform, renders into a pooled buffer and appends.
    - The audio lane pulls samples and appends them untouched.

    Each lane waits for the sink to report readiness on its track before
    pulling the next item, so the sink paces decoding. Whichever lane
    finishes last finalizes the output. If either lane fails, or the run is
    cancelled, both lanes stop and the partial output is deleted.
*/

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace};

use media_sink::{SinkConfig, SinkFactory, VideoSettings};
use media_source::{AudioReader, FrameSource, OpenedSource, VideoReader};
use media_transform::{OrientationPlan, StyleTransform};
use media_types::{Error, Result, TrackKind};

use crate::{
    config::PipelineConfig,
    output::PartialOutput,
    pool::BufferPool,
    progress::ProgressState,
    session::{WriterSession, WriterState},
    stage::VideoStage,
};

type ProgressCallback = Box<dyn FnMut(f64) + Send>;
type CompleteCallback = Box<dyn FnOnce(&PipelineReport) + Send>;

/**
    Summary of a successful run.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineReport {
    /// Where the finished file was written.
    pub output: PathBuf,
    pub frames_written: u64,
    pub audio_samples_written: u64,
    /// Frames written untransformed because the transform failed.
    pub transform_failures: u64,
    pub elapsed: Duration,
}

impl PipelineReport {
    /**
        Effective processing rate in video frames per second.
    */
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames_written as f64 / secs
        } else {
            0.0
        }
    }
}

/**
    Stops a run: sets the shared stop flag and closes the buffer pool so a
    lane blocked on a buffer wakes up.
*/
#[derive(Clone, Debug)]
pub(crate) struct CancelToken {
    stop: Arc<AtomicBool>,
    pool: BufferPool,
}

impl CancelToken {
    fn new(pool: BufferPool) -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            pool,
        }
    }

    fn cancel(&self) {
        self.stop.store(true, Ordering::Release);
        self.pool.close();
    }

    fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/**
    An offline style-transfer run over one asset.

    ```ignore
    let report = Pipeline::new(source, Box::new(PixelFilter::Grayscale), FileSinkFactory, "out.mov")
        .on_progress(|fraction| println!("{:.0}%", fraction * 100.0))
        .run()?;
    ```
*/
pub struct Pipeline {
    source: Box<dyn FrameSource + Send>,
    transform: Box<dyn StyleTransform>,
    sinks: Arc<dyn SinkFactory>,
    output: PathBuf,
    config: PipelineConfig,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
}

impl Pipeline {
    pub fn new(
        source: impl FrameSource + Send + 'static,
        transform: Box<dyn StyleTransform>,
        sinks: impl SinkFactory + 'static,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: Box::new(source),
            transform,
            sinks: Arc::new(sinks),
            output: output.into(),
            config: PipelineConfig::default(),
            on_progress: None,
            on_complete: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /**
        Called on the video lane after every written frame with the
        fraction of the estimated frame count processed so far.
    */
    pub fn on_progress(mut self, callback: impl FnMut(f64) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /**
        Called once the output has been finalized and moved into place.
        Never called for a failed or cancelled run.
    */
    pub fn on_complete(mut self, callback: impl FnOnce(&PipelineReport) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /**
        Process the whole asset on the calling thread's behalf, blocking
        until the output is finished or the run fails.
    */
    pub fn run(self) -> Result<PipelineReport> {
        let token = CancelToken::new(BufferPool::new(self.config.pool_capacity));
        self.run_with(token)
    }

    /**
        Start processing in the background.
    */
    pub fn spawn(self) -> PipelineHandle {
        let cancel = CancelToken::new(BufferPool::new(self.config.pool_capacity));
        let token = cancel.clone();
        let thread = thread::spawn(move || self.run_with(token));
        PipelineHandle {
            cancel,
            thread: Some(thread),
        }
    }

    fn run_with(self, token: CancelToken) -> Result<PipelineReport> {
        let Self {
            source,
            transform,
            sinks,
            output,
            config,
            on_progress,
            on_complete,
        } = self;
        let started = Instant::now();

        let OpenedSource { asset, video, audio } = source.open()?;
        let plan = OrientationPlan::resolve(&asset.video, config.rotation_policy);
        info!(
            width = asset.video.width,
            height = asset.video.height,
            rotation = plan.source_rotation.degrees(),
            baked = plan.rotate_frames,
            audio = asset.has_audio(),
            output = %output.display(),
            "processing asset"
        );

        let audio = match (audio, asset.audio.clone()) {
            (Some(reader), Some(info)) => Some((reader, info)),
            _ => None,
        };

        let mut settings = VideoSettings::for_track(
            &asset.video,
            plan.output_width,
            plan.output_height,
            plan.output_transform,
        );
        if let Some(bitrate) = config.video_bitrate {
            settings = settings.with_bitrate(bitrate);
        }
        let sink_config = SinkConfig::new(config.container)
            .with_video(settings)
            .with_optional_audio(audio.as_ref().map(|(_, info)| info.clone()))
            .with_fast_start(config.fast_start);

        let partial = PartialOutput::create(&output)?;
        let sink = sinks.create(partial.path(), &sink_config)?;
        let session = Arc::new(WriterSession::new(
            sink,
            audio.is_some(),
            config.poll_interval(),
        ));

        let lanes = Arc::new(Lanes {
            session: Arc::clone(&session),
            token: token.clone(),
            first_error: Mutex::new(None),
        });

        let video_handle = {
            let lanes = Arc::clone(&lanes);
            let stage = VideoStage::new(plan, transform, token.pool.clone());
            let progress = ProgressState::new(asset.video.estimated_frame_count());
            thread::spawn(move || {
                let result = run_video_lane(video, stage, &lanes, progress, on_progress);
                lanes.settle("video", result)
            })
        };
        let audio_handle = audio.map(|(reader, _)| {
            let lanes = Arc::clone(&lanes);
            thread::spawn(move || {
                let result = run_audio_lane(reader, &lanes);
                lanes.settle("audio", result)
            })
        });

        let video_report = join_lane(&lanes, "video", video_handle);
        let audio_samples = match audio_handle {
            Some(handle) => join_lane(&lanes, "audio", handle),
            None => Some(0),
        };

        if let Some(error) = lanes.first_error.lock().take() {
            if error.is_cancelled() {
                info!("processing cancelled, discarding partial output");
            }
            return Err(error);
        }
        let (Some(video_report), Some(audio_samples)) = (video_report, audio_samples) else {
            return Err(Error::Cancelled);
        };
        if session.state() != WriterState::Finished {
            return Err(Error::invalid_data(format!(
                "writer session ended as {:?}",
                session.state()
            )));
        }

        let output = partial.persist()?;
        let report = PipelineReport {
            output,
            frames_written: video_report.frames,
            audio_samples_written: audio_samples,
            transform_failures: video_report.transform_failures,
            elapsed: started.elapsed(),
        };
        info!(
            frames = report.frames_written,
            audio = report.audio_samples_written,
            transform_failures = report.transform_failures,
            elapsed_ms = report.elapsed.as_millis() as u64,
            fps = report.fps(),
            path = %report.output.display(),
            "processing finished"
        );

        if let Some(callback) = on_complete {
            callback(&report);
        }
        Ok(report)
    }
}

/**
    Handle to a pipeline running in the background.

    Dropping the handle cancels the run and waits for it to stop.
*/
pub struct PipelineHandle {
    cancel: CancelToken,
    thread: Option<JoinHandle<Result<PipelineReport>>>,
}

impl PipelineHandle {
    /**
        Request that the run stop. Both lanes stop at their next
        suspension point and the partial output is deleted; [`wait`]
        then returns [`Error::Cancelled`].

        A run that already finalized its output is unaffected.

        [`wait`]: PipelineHandle::wait
    */
    pub fn cancel(&self) {
        debug!("pipeline cancellation requested");
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /**
        Block until the run ends and return its outcome.
    */
    pub fn wait(mut self) -> Result<PipelineReport> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or_else(|_| Err(Error::invalid_data("pipeline thread panicked"))),
            None => Err(Error::Cancelled),
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.cancel.cancel();
            let _ = thread.join();
        }
    }
}

/**
    State shared by the two lanes of a run.
*/
struct Lanes {
    session: Arc<WriterSession>,
    token: CancelToken,
    first_error: Mutex<Option<Error>>,
}

impl Lanes {
    /**
        Record a lane failure and stop the other lane. Only the first
        failure is kept.
    */
    fn fail(&self, lane: &str, error: Error) {
        {
            let mut first = self.first_error.lock();
            if first.is_none() {
                if !error.is_cancelled() {
                    error!(lane, error = %error, "lane failed, aborting run");
                }
                *first = Some(error);
            } else {
                trace!(lane, error = %error, "lane stopped after earlier failure");
            }
        }
        self.token.cancel();
        self.session.abort();
    }

    fn settle<T>(&self, lane: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(lane, e);
                None
            }
        }
    }

    fn stop_flag(&self) -> &AtomicBool {
        &self.token.stop
    }
}

fn join_lane<T>(lanes: &Lanes, lane: &str, handle: JoinHandle<Option<T>>) -> Option<T> {
    match handle.join() {
        Ok(value) => value,
        Err(_) => {
            lanes.fail(lane, Error::invalid_data(format!("{lane} lane panicked")));
            None
        }
    }
}

struct VideoLaneReport {
    frames: u64,
    transform_failures: u64,
}

#[instrument(name = "video_lane", skip_all)]
fn run_video_lane(
    mut reader: VideoReader,
    mut stage: VideoStage,
    lanes: &Lanes,
    mut progress: ProgressState,
    mut on_progress: Option<ProgressCallback>,
) -> Result<VideoLaneReport> {
    let session = &lanes.session;
    let mut frames = 0u64;

    loop {
        session.wait_until_ready(TrackKind::Video, lanes.stop_flag())?;
        let Some(frame) = reader.next()? else {
            break;
        };
        if !frame.is_well_formed() {
            return Err(Error::decode(format!(
                "frame {frames} has {} bytes, expected {}",
                frame.data.len(),
                frame.geometry().byte_len()
            )));
        }

        let styled = stage.stylize(frame)?;
        let buffer = stage.render(&styled)?;
        session.append_video(Box::new(buffer), styled.pts)?;
        frames += 1;
        trace!(pts = styled.pts.0, frames, "video frame written");

        let fraction = progress.advance();
        if let Some(callback) = on_progress.as_mut() {
            callback(fraction);
        }
    }

    debug!(frames, transform_failures = stage.transform_failures(), "video source exhausted");
    session.mark_finished(TrackKind::Video)?;
    Ok(VideoLaneReport {
        frames,
        transform_failures: stage.transform_failures(),
    })
}

#[instrument(name = "audio_lane", skip_all)]
fn run_audio_lane(mut reader: AudioReader, lanes: &Lanes) -> Result<u64> {
    let session = &lanes.session;
    let mut samples = 0u64;

    loop {
        session.wait_until_ready(TrackKind::Audio, lanes.stop_flag())?;
        let Some(sample) = reader.next()? else {
            break;
        };
        let pts = sample.pts;
        session.append_audio(sample, pts)?;
        samples += 1;
    }

    debug!(samples, "audio source exhausted");
    session.mark_finished(TrackKind::Audio)?;
    Ok(samples)
}

static_assertions::assert_impl_all!(Pipeline: Send);
