use std::path::PathBuf;

/// Errors raised while configuring or running a reader.
///
/// Everything except [`ReaderError::Conversion`] and
/// [`ReaderError::Constraint`] is fatal for the load job.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// Bad, duplicate or unsupported option or locator.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The producer's row shape is incompatible with the destination.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The parser kind does not implement the requested capability.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A hard limit was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// The producer (function or channel peer) broke its calling convention.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// No function or type matches the reference.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one function matches the reference.
    #[error("ambiguous reference: {0}")]
    AmbiguousReference(String),

    /// Writing the bad-record file failed.
    #[error("could not write parse badfile \"{path}\": {source}")]
    BadRecordFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The channel failed underneath a parser.
    #[error("channel error: {0}")]
    Channel(#[from] bulkload_channel::ChannelError),

    /// A field of one record could not be converted.
    #[error("conversion failed at field {field}: {message}")]
    Conversion { field: usize, message: String },

    /// A converted row violated a constraint.
    #[error("constraint violated at field {field}: {message}")]
    Constraint { field: usize, message: String },

    /// More records failed conversion than `PARSE_ERRORS` allows.
    #[error("too many parse errors ({count}, max {max})")]
    ParseErrorLimit { count: u64, max: u64 },
}

impl ReaderError {
    /// Whether the error concerns a single record and may be skipped.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            ReaderError::Conversion { .. } | ReaderError::Constraint { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ReaderError>;
