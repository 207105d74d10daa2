use std::io::{ErrorKind, Write};

use bulkload_channel::IpcStream;
use bytes::BytesMut;
use tracing::debug;

use crate::codec::{encode_frame, encode_terminator, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes framed records to any `Write` stream.
///
/// This is the producing side of a channel: a writer process frames each row
/// and finishes the stream with the zero-length terminator.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    sent: u64,
    finished: bool,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            sent: 0,
            finished: false,
        }
    }

    /// Frame and send one record payload (blocking).
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.finished {
            return Err(FrameError::Finished);
        }
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;
        self.write_buffered()?;
        self.sent += 1;
        Ok(())
    }

    /// Send the end-of-stream marker and flush.
    ///
    /// Calling `finish` more than once is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.buf.clear();
        encode_terminator(&mut self.buf);
        self.write_buffered()?;
        self.finished = true;
        debug!(records = self.sent, "frame stream finished");
        self.flush()
    }

    /// Number of records sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Whether the terminator has been written.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    return Err(FrameError::ConnectionClosed)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl FrameWriter<IpcStream> {
    /// Finish the stream and shut the socket down so the loader observes
    /// closure even if it reads past the terminator.
    pub fn close(mut self) -> Result<()> {
        self.finish()?;
        self.inner.shutdown()?;
        Ok(())
    }
}
