/// Errors that can occur while framing records.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Zero-length payloads are reserved for the end-of-stream marker.
    #[error("empty payload cannot be framed (length 0 marks end of stream)")]
    EmptyPayload,

    /// The stream has already been terminated.
    #[error("frame stream already finished")]
    Finished,

    /// An I/O error occurred while writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] bulkload_channel::ChannelError),

    /// The reading side went away.
    #[error("channel closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
