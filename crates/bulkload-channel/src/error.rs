use std::path::PathBuf;

/// Errors that can occur while creating, opening or using a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to bind a socket channel.
    #[error("failed to bind channel socket {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a socket channel.
    #[error("failed to connect to channel socket {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept the loader connection.
    #[error("failed to accept loader connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the channel.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path derived from the key is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// No channel was created under this key.
    #[error("no channel exists for key {0}")]
    UnknownKey(u32),

    /// A channel already exists under this key.
    #[error("channel key {0} is already in use")]
    KeyInUse(u32),

    /// The reading end of this channel has already been handed out.
    #[error("channel {0} is already open")]
    AlreadyOpen(u32),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
