use std::io::{ErrorKind, Read, Write};

use crate::error::{ChannelError, Result};

/// The loader's view of a channel: a blocking FIFO byte source.
///
/// There is no timeout and no in-band cancellation. A read blocks until the
/// requested bytes arrive or the writing side closes the channel.
pub trait Channel: Send {
    /// Fill `buf` completely (blocking).
    ///
    /// Returns the number of bytes read. This is less than `buf.len()` only
    /// when the channel was closed before enough bytes arrived.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the reading end. Further writes on the other side fail.
    fn close(&mut self) -> Result<()>;
}

/// Opens the reading end of a channel by key.
pub trait ChannelOpener: Send + Sync {
    /// Open the channel registered under `key`.
    fn open(&self, key: u32) -> Result<Box<dyn Channel>>;
}

/// Read from `reader` until `buf` is full or EOF is reached.
///
/// Retries on `Interrupted`; any other I/O error is returned.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }
    Ok(filled)
}

/// A connected socket channel stream. Implements `Read` and `Write`.
///
/// The writer side writes frames into it; the loader side reads them back
/// through [`Channel`].
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl IpcStream {
    /// Create an IpcStream from a Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }

    /// Connected pair of streams, for in-process tests and demos.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Shut down both directions of the stream.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Ok(()) => Ok(()),
                // The peer already went away.
                Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
                Err(err) => Err(ChannelError::Io(err)),
            },
        }
    }
}

impl Channel for IpcStream {
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        read_full(self, buf)
    }

    fn close(&mut self) -> Result<()> {
        self.shutdown()
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => f.debug_struct("IpcStream").field("type", &"unix").finish(),
        }
    }
}
