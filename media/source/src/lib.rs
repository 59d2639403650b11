/*!
    Frame sources for the stylize media pipeline.

    A source wraps a decodable asset. Opening it yields the asset's
    description plus one reader per track; the readers are independent, so
    the video and audio lanes can each pull from their own thread at their
    own pace.

    # Example

    ```ignore
    use media_source::{FrameSource, MemorySource};

    let source = MemorySource::synthetic(640, 360, 90, Rational::new(30, 1));
    let opened = source.open()?;

    let mut video = opened.video;
    while let Some(frame) = video.next()? {
        // Process frame
    }
    ```

    # Sources

    - [`MemorySource`]: scripted frames and samples held in memory, with
      optional decode failures and per-read delays. Used by tests and
      benchmarks.
    - `FileSource` (feature `ffmpeg`): decodes a media file, converting
      video to packed BGRA and reading the display matrix for rotation.
      Audio packets are passed through still encoded.
*/

pub use media_types::{AudioSample, Error, MediaAsset, Result, VideoFrame};

#[cfg(feature = "ffmpeg")]
mod file;
mod memory;
mod reader;

#[cfg(feature = "ffmpeg")]
pub use file::FileSource;
pub use memory::MemorySource;
pub use reader::{AudioReader, FrameSource, OpenedSource, TrackReader, VideoReader};
