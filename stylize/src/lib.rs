/*!
    Per-frame style transfer for recorded and live video.

    Every video frame of an asset or capture feed is run through an
    external [`StyleTransform`], and the results are written to a new file
    together with the untouched audio track.

    # Offline

    [`Pipeline`] processes a complete asset. Video and audio are pulled on
    separate lanes, paced by the sink's readiness, and the output file only
    appears at its destination once it has been finalized:

    ```ignore
    use stylize::{Pipeline, PipelineConfig};

    let report = Pipeline::new(source, Box::new(model), sinks, "styled.mov")
        .with_config(PipelineConfig::default())
        .on_progress(|fraction| eprintln!("{:.0}%", fraction * 100.0))
        .run()?;
    ```

    # Live

    [`RecordingSession`] takes frames and samples from capture threads,
    transforms at most one frame at a time, and records between
    [`start`](RecordingSession::start) and [`stop`](RecordingSession::stop)
    with timestamps rebased to the first recorded frame.

    # Still images

    [`still::process_image`] applies a transform to a single image file.
*/

mod config;
mod output;
mod pipeline;
mod pool;
mod progress;
mod recording;
mod session;
mod stage;

pub mod logging;
pub mod still;

pub use config::PipelineConfig;
pub use output::PartialOutput;
pub use pipeline::{Pipeline, PipelineHandle, PipelineReport};
pub use pool::{BufferPool, PooledBuffer};
pub use progress::ProgressState;
pub use recording::{RecordingSession, RecordingState, RecordingStats};
pub use session::{Completion, WriterSession, WriterState};
pub use stage::{OUTPUT_FORMAT, StyledFrame, VideoStage};

pub use media_transform::{PixelFilter, RotationPolicy, StyleTransform, TransformError};
pub use media_types::{Error, Result};
