use thiserror::Error;

use crate::media::MediaKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the reader, its processors and the backends behind them.
///
/// Transient "try again" and end-of-stream conditions are not errors; they are
/// reported through [`crate::Status`] and [`crate::Progress`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to find stream information: {0}")]
    ProbeFailed(String),

    #[error("source stream index {index} out of range (0..{count})")]
    SourceIndexOutOfRange { index: usize, count: usize },

    #[error("output stream index {index} out of range (0..{count})")]
    OutputIndexOutOfRange { index: usize, count: usize },

    #[error("stream {index} is not {expected} stream")]
    MediaKindMismatch { index: usize, expected: MediaKind },

    #[error("failed to detect the format of source stream {0}")]
    UndetectedFormat(usize),

    #[error("timestamp must be non-negative, got {0}")]
    NegativeTimestamp(f64),

    #[error("hardware acceleration is not available: {0}")]
    HwAccelUnavailable(String),

    #[error("only CUDA is supported for hardware acceleration, found: {0}")]
    UnsupportedDevice(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown output stream key {0}")]
    UnknownKey(usize),

    #[error("failed to seek: {0}")]
    SeekFailed(String),

    #[error("frame layout changed inside a chunk: {expected} -> {found}")]
    LayoutMismatch { expected: String, found: String },

    #[error("timed out waiting for data")]
    Timeout,

    #[cfg(feature = "ffmpeg")]
    #[error("ffmpeg: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
