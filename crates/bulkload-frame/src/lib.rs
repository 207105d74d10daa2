//! Length-prefixed record framing for bulk-load channels.
//!
//! Every record travelling through a channel is framed as:
//! - A 4-byte little-endian payload length
//! - Exactly that many payload bytes
//!
//! A length of zero is reserved: it is the explicit end-of-stream marker the
//! writer sends once it has no more records. Empty records cannot be framed.

pub mod codec;
pub mod error;
pub mod writer;

pub use codec::{
    decode_frame, decode_length, encode_frame, encode_terminator, Frame, FrameConfig,
    DEFAULT_MAX_PAYLOAD, LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use writer::FrameWriter;
