use std::fmt;
use std::io;

use bulkload_channel::ChannelError;
use bulkload_frame::FrameError;
use bulkload_reader::ReaderError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const CHANNEL_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => CHANNEL_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::Bind { source, .. }
        | ChannelError::Connect { source, .. }
        | ChannelError::Accept(source)
        | ChannelError::Io(source) => io_error(context, source),
        other => CliError::new(CHANNEL_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Channel(err) => channel_error(context, err),
        FrameError::PayloadTooLarge { .. } | FrameError::EmptyPayload => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn reader_error(context: &str, err: ReaderError) -> CliError {
    match err {
        ReaderError::Channel(err) => channel_error(context, err),
        ReaderError::BadRecordFile { path, source } => {
            io_error(&format!("{context}: {}", path.display()), source)
        }
        ReaderError::Configuration(_)
        | ReaderError::UnsupportedFeature(_)
        | ReaderError::NotFound(_)
        | ReaderError::AmbiguousReference(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ReaderError::SchemaMismatch(_)
        | ReaderError::ProtocolViolation(_)
        | ReaderError::ResourceLimitExceeded(_)
        | ReaderError::Conversion { .. }
        | ReaderError::Constraint { .. }
        | ReaderError::ParseErrorLimit { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}
