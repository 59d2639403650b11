/*!
    Shared types for the stylize media pipeline.

    This crate defines the vocabulary that crosses crate boundaries. The
    source, transform, sink and pipeline crates all speak in these types. It
    has no dependency on FFmpeg, so consumers that only move frames around
    never pull in codec bindings.

    # Core Types

    - [`Rational`] - Rational numbers for time bases and frame rates
    - [`Pts`] and [`MediaDuration`] - Timestamps in time_base units
    - [`VideoFrame`] and [`AudioSample`] - Frames and passthrough audio
    - [`Sample`] and [`TrackKind`] - Tagged per-track samples

    # Geometry

    - [`PixelFormat`] and [`Geometry`] - Packed frame layouts
    - [`Rotation`] and [`DisplayTransform`] - Track orientation

    # Asset Information

    - [`VideoTrackInfo`] and [`AudioTrackInfo`] - Track metadata
    - [`MediaAsset`] - Combined asset description

    # Error Handling

    - [`Error`] and [`Result`] - Pipeline error taxonomy
*/

mod codec;
mod error;
mod format;
mod frame;
mod orientation;
mod rational;
mod sample;
mod stream;
mod timestamp;

pub use codec::CodecId;
pub use error::{Error, Result};
pub use format::{Geometry, PixelFormat};
pub use frame::{AudioSample, VideoFrame};
pub use orientation::{DisplayTransform, Rotation};
pub use rational::Rational;
pub use sample::{Sample, TrackKind};
pub use stream::{AudioTrackInfo, MediaAsset, VideoTrackInfo};
pub use timestamp::{MediaDuration, Pts};
