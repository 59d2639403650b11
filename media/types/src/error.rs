/*!
    Error types for the stylize media pipeline.
*/

use thiserror::Error;

/**
    Error type shared by sources, sinks and the pipeline.

    The variants mirror how a failure is handled: `AssetUnreadable` is
    reported before anything is written, `DecodeFailed` and `MuxFailed`
    terminate a running pipeline and invalidate its partial output.
*/
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file not found, disk full, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The asset has no usable video track or cannot be opened at all
    #[error("asset unreadable: {message}")]
    AssetUnreadable { message: String },
    /// Mid-stream decode error
    #[error("decode failed: {message}")]
    DecodeFailed { message: String },
    /// Encoder or container flush error
    #[error("mux failed: {message}")]
    MuxFailed { message: String },
    /// Invalid data (malformed input or mismatched buffer)
    #[error("invalid data: {message}")]
    InvalidData { message: String },
    /// Unsupported format (valid but not handled)
    #[error("unsupported format: {message}")]
    UnsupportedFormat { message: String },
    /// Processing was stopped by the caller
    #[error("processing cancelled")]
    Cancelled,
    /// The source produced no video frames, so there is nothing to finalize
    #[error("no video frames were written")]
    NothingWritten,
}

impl Error {
    pub fn asset_unreadable(message: impl Into<String>) -> Self {
        Self::AssetUnreadable {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn mux(message: impl Into<String>) -> Self {
        Self::MuxFailed {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    /**
        Returns true if this error was caused by a cancellation request
        rather than by the media itself.
    */
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/**
    Result type alias for the stylize media pipeline.
*/
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn error_display() {
        assert_eq!(
            Error::decode("corrupt slice").to_string(),
            "decode failed: corrupt slice"
        );
        assert_eq!(Error::mux("disk full").to_string(), "mux failed: disk full");
        assert_eq!(
            Error::asset_unreadable("no video track").to_string(),
            "asset unreadable: no video track"
        );
        assert_eq!(Error::Cancelled.to_string(), "processing cancelled");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::StorageFull, "no space left");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(StdError::source(&e).is_some());
        assert!(StdError::source(&Error::NothingWritten).is_none());
    }

    #[test]
    fn cancelled_is_distinguishable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::decode("x").is_cancelled());
    }
}
