/// Errors that can occur while reconstructing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A fixed-size accumulator was configured with a frame size of zero.
    #[error("invalid frame size 0 (must be at least 1 byte)")]
    InvalidFrameSize,

    /// A line decoder was configured with an empty delimiter.
    #[error("line delimiter must not be empty")]
    EmptyDelimiter,

    /// A line was not valid base64.
    #[error("malformed base64 line ({len} bytes): {source}")]
    Base64 {
        len: usize,
        source: base64::DecodeError,
    },

    /// A line grew past the configured maximum without a delimiter.
    #[error("line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An I/O error surfaced through the codec interface.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
