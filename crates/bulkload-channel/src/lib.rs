//! Bounded, key-addressed byte channels.
//!
//! A channel carries the raw byte stream between a bulk-load writer and the
//! loader that consumes it. Two implementations are provided:
//! - [`MemoryQueue`]: a bounded in-process ring buffer (threads in one process)
//! - [`SocketQueue`]: a Unix domain socket addressed by key (separate processes)
//!
//! Both are opened on the loader side through [`ChannelOpener`], keyed by a
//! `u32`. This is the lowest layer of bulkload; frame decoding lives above it.

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use config::{ChannelConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::{ChannelError, Result};
pub use memory::{MemoryQueue, QueueReader, QueueRegistry, QueueWriter};
pub use traits::{read_full, Channel, ChannelOpener, IpcStream};

#[cfg(unix)]
pub use uds::{SocketDirectory, SocketQueue};
