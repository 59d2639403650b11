/*!
    Source and track reader traits.
*/

use media_types::{AudioSample, MediaAsset, Result, VideoFrame};

/**
    A pull-based reader over a single track.

    Returns `Ok(None)` once the track is exhausted. A reader that returned
    an error must not be read again.
*/
pub trait TrackReader<T>: Send {
    fn next(&mut self) -> Result<Option<T>>;
}

pub type VideoReader = Box<dyn TrackReader<VideoFrame>>;
pub type AudioReader = Box<dyn TrackReader<AudioSample>>;

/**
    A freshly opened source: the asset description and one reader per track.
*/
pub struct OpenedSource {
    pub asset: MediaAsset,
    pub video: VideoReader,
    pub audio: Option<AudioReader>,
}

impl std::fmt::Debug for OpenedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSource")
            .field("asset", &self.asset)
            .field("has_audio", &self.audio.is_some())
            .finish_non_exhaustive()
    }
}

/**
    A decodable asset.
*/
pub trait FrameSource {
    /**
        Open the asset for reading.

        Fails with [`Error::AssetUnreadable`](media_types::Error::AssetUnreadable)
        if the asset cannot be read or has no video track.
    */
    fn open(&self) -> Result<OpenedSource>;
}
