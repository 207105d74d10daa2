//! Ingestion front end of a bulk data loader.
//!
//! bulkload turns external sources into a uniform sequence of typed rows:
//! set-producing functions driven through their calling convention, and
//! length-framed record streams fed through a bounded channel by a concurrent
//! writer.
//!
//! # Crate Structure
//!
//! - [`channel`]: Bounded, key-addressed byte channels (in-process queue, Unix socket)
//! - [`frame`]: Length-prefixed record framing and the frame writer
//! - [`reader`]: Parsers, function catalog and the reader driver

/// Re-export channel types.
pub mod channel {
    pub use bulkload_channel::*;
}

/// Re-export frame types.
pub mod frame {
    pub use bulkload_frame::*;
}

/// Re-export reader types.
pub mod reader {
    pub use bulkload_reader::*;
}
