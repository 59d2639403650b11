/*!
    Sink traits.
*/

use std::path::Path;

use media_types::{AudioSample, Geometry, Pts, Result, TrackKind, VideoFrame};

use crate::SinkConfig;

/**
    A filled frame buffer handed to a sink.

    The sink owns the buffer until it has finished consuming it and then
    drops it. Pooled buffers return to their pool on drop, which is what
    ties encoder progress back to the producer.
*/
pub trait FrameBuffer: Send {
    fn geometry(&self) -> Geometry;
    fn data(&self) -> &[u8];
}

impl FrameBuffer for VideoFrame {
    fn geometry(&self) -> Geometry {
        VideoFrame::geometry(self)
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

/**
    An encodable container with one video track and an optional audio track.

    Calls are made from whichever lane thread currently holds the writer
    session, never concurrently.
*/
pub trait FrameSink: Send {
    /**
        Begin the writing session at `at`, in the video track's time base.

        Must be called once, before the first append.
    */
    fn start_session(&mut self, at: Pts) -> Result<()>;

    /**
        Returns true if `track` can accept another append right now.
    */
    fn is_ready_for_more_data(&mut self, track: TrackKind) -> bool;

    /**
        Append a rendered video buffer.

        Appending while the video track is not ready is a caller bug and
        fails with [`Error::InvalidData`](media_types::Error::InvalidData).
    */
    fn append_video(&mut self, buffer: Box<dyn FrameBuffer>, pts: Pts) -> Result<()>;

    /**
        Append an audio sample, stamped with `pts` in the sample's time base.
    */
    fn append_audio(&mut self, sample: AudioSample, pts: Pts) -> Result<()>;

    /**
        Mark `track` as complete. Calling this more than once per track has
        no further effect.
    */
    fn mark_track_finished(&mut self, track: TrackKind);

    /**
        Flush and close the container.

        Fails with [`Error::MuxFailed`](media_types::Error::MuxFailed) if
        the flush fails; the file is unusable in that case.
    */
    fn finalize(self: Box<Self>) -> Result<()>;
}

/**
    Creates sinks on demand.

    The pipeline opens its sink lazily, once the output geometry is known,
    and the live pipeline opens a new one for every recording.
*/
pub trait SinkFactory: Send + Sync {
    fn create(&self, path: &Path, config: &SinkConfig) -> Result<Box<dyn FrameSink>>;
}
