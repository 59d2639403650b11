use media_types::PixelFormat;
use thiserror::Error;

/**
    Errors from the per-frame stages.
*/
#[derive(Debug, Error)]
pub enum TransformError {
    /// The external transform reported a failure
    #[error("transform failed: {0}")]
    Failed(String),

    #[error("malformed frame: expected {expected} bytes of pixel data, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("cannot render {from:?} pixels into a {to:?} buffer")]
    IncompatibleFormat { from: PixelFormat, to: PixelFormat },

    #[error("destination buffer holds {actual} bytes, geometry needs {expected}")]
    BufferSize { expected: usize, actual: usize },
}

impl TransformError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
