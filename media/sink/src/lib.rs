/*!
    Muxing sinks for the stylize media pipeline.

    A sink wraps an encodable container with one video track and at most
    one audio track. It is pull-based: the pipeline asks each track whether
    the sink is ready for more data before appending, so a slow encoder
    throttles the lanes feeding it instead of queueing without bound.

    # Basic Usage

    ```ignore
    use media_sink::{FrameSink, ManifestSinkFactory, SinkConfig, SinkFactory, VideoSettings};

    let config = SinkConfig::quicktime()
        .with_video(VideoSettings::for_track(&asset.video, 1080, 1920, DisplayTransform::IDENTITY))
        .with_optional_audio(asset.audio.clone());

    let mut sink = ManifestSinkFactory::default().create("out.mov".as_ref(), &config)?;
    sink.start_session(Pts::ZERO)?;

    if sink.is_ready_for_more_data(TrackKind::Video) {
        sink.append_video(Box::new(frame), pts)?;
    }

    sink.mark_track_finished(TrackKind::Video);
    sink.mark_track_finished(TrackKind::Audio);
    sink.finalize()?;
    ```

    # Finalization

    [`FrameSink::finalize`] consumes the sink. Without it the container is
    missing its index and most players will refuse to open it.

    # Sinks

    - [`ManifestSink`]: records everything it is given and writes a JSON
      manifest on finalize. Readiness, buffer retention and flush failures
      can be scripted, which makes it the sink of choice for tests.
    - `FileSink` (feature `ffmpeg`): encodes video as H.264 and copies
      audio packets into a QuickTime or MP4 file. Its tracks report ready
      only while neither runs more than [`INTERLEAVE_WINDOW`] ahead of the
      other, see [`Interleave`].
*/

pub use media_types::{
    AudioSample, AudioTrackInfo, DisplayTransform, Error, Geometry, Pts, Rational, Result,
    TrackKind, VideoFrame,
};

mod config;
#[cfg(feature = "ffmpeg")]
mod file;
mod interleave;
mod manifest;
mod sink;

pub use config::{ContainerFormat, SinkConfig, VideoSettings};
#[cfg(feature = "ffmpeg")]
pub use file::{FileSink, FileSinkFactory};
pub use interleave::{INTERLEAVE_WINDOW, Interleave};
pub use manifest::{
    ManifestSink, ManifestSinkFactory, SinkEvent, SinkLog, SinkManifest, SinkScript,
};
pub use sink::{FrameBuffer, FrameSink, SinkFactory};
