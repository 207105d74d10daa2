use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::debug;

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::traits::{read_full, Channel, ChannelOpener};

/// Bounded in-process byte queue with one writer and one reader.
///
/// The writer blocks while the queue is full; the reader blocks while it is
/// empty. Closing or dropping the writer lets the reader drain what is left
/// and then observe end-of-stream.
pub struct MemoryQueue;

impl MemoryQueue {
    /// Create a queue holding at most `capacity` bytes in flight.
    pub fn with_capacity(capacity: usize) -> (QueueWriter, QueueReader) {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                buf: VecDeque::with_capacity(capacity),
                writer_closed: false,
                reader_closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity: capacity.max(1),
        });
        (
            QueueWriter {
                shared: Arc::clone(&shared),
            },
            QueueReader { shared },
        )
    }
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

struct State {
    buf: VecDeque<u8>,
    writer_closed: bool,
    reader_closed: bool,
}

impl Shared {
    fn lock(&self) -> std::io::Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| std::io::Error::other("queue lock poisoned"))
    }
}

/// Writing end of a [`MemoryQueue`].
pub struct QueueWriter {
    shared: Arc<Shared>,
}

impl QueueWriter {
    /// Close the writing end. The reader sees end-of-stream once drained.
    pub fn close(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.writer_closed = true;
        }
        self.shared.readable.notify_all();
    }
}

impl Write for QueueWriter {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.lock()?;
        loop {
            if state.reader_closed {
                return Err(std::io::Error::new(
                    ErrorKind::BrokenPipe,
                    "queue reader closed",
                ));
            }
            if state.writer_closed {
                return Err(std::io::Error::new(
                    ErrorKind::BrokenPipe,
                    "queue writer closed",
                ));
            }
            if state.buf.len() < self.shared.capacity {
                break;
            }
            state = self
                .shared
                .writable
                .wait(state)
                .map_err(|_| std::io::Error::other("queue lock poisoned"))?;
        }

        let room = self.shared.capacity - state.buf.len();
        let n = room.min(data.len());
        state.buf.extend(&data[..n]);
        drop(state);
        self.shared.readable.notify_all();
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for QueueWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reading end of a [`MemoryQueue`].
pub struct QueueReader {
    shared: Arc<Shared>,
}

impl Read for QueueReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.lock()?;
        while state.buf.is_empty() {
            if state.writer_closed || state.reader_closed {
                return Ok(0);
            }
            state = self
                .shared
                .readable
                .wait(state)
                .map_err(|_| std::io::Error::other("queue lock poisoned"))?;
        }

        let n = buf.len().min(state.buf.len());
        for (dst, src) in buf.iter_mut().zip(state.buf.drain(..n)) {
            *dst = src;
        }
        drop(state);
        self.shared.writable.notify_all();
        Ok(n)
    }
}

impl Channel for QueueReader {
    fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        read_full(self, buf)
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.shared.lock()?;
        state.reader_closed = true;
        state.buf.clear();
        drop(state);
        self.shared.writable.notify_all();
        Ok(())
    }
}

impl Drop for QueueReader {
    fn drop(&mut self) {
        let _ = Channel::close(self);
    }
}

/// Key-addressed set of in-process queues.
///
/// The writer side creates a queue under a key and keeps the writing end; the
/// loader opens the reading end by the same key, exactly once.
#[derive(Default)]
pub struct QueueRegistry {
    config: ChannelConfig,
    readers: Mutex<HashMap<u32, Slot>>,
}

enum Slot {
    Ready(QueueReader),
    Opened,
}

impl QueueRegistry {
    /// Create an empty registry with default configuration.
    pub fn new() -> Self {
        Self::with_config(ChannelConfig::default())
    }

    /// Create an empty registry with explicit configuration.
    pub fn with_config(config: ChannelConfig) -> Self {
        Self {
            config,
            readers: Mutex::new(HashMap::new()),
        }
    }

    /// Create a queue under `key` and return its writing end.
    pub fn create(&self, key: u32) -> Result<QueueWriter> {
        let mut readers = self.slots()?;
        if readers.contains_key(&key) {
            return Err(ChannelError::KeyInUse(key));
        }
        let (writer, reader) = MemoryQueue::with_capacity(self.config.queue_capacity);
        readers.insert(key, Slot::Ready(reader));
        debug!(key, capacity = self.config.queue_capacity, "created queue");
        Ok(writer)
    }

    fn slots(&self) -> Result<MutexGuard<'_, HashMap<u32, Slot>>> {
        self.readers
            .lock()
            .map_err(|_| ChannelError::Io(std::io::Error::other("registry lock poisoned")))
    }
}

impl ChannelOpener for QueueRegistry {
    fn open(&self, key: u32) -> Result<Box<dyn Channel>> {
        let mut readers = self.slots()?;
        match readers.get_mut(&key) {
            None => Err(ChannelError::UnknownKey(key)),
            Some(slot) => match std::mem::replace(slot, Slot::Opened) {
                Slot::Ready(reader) => {
                    debug!(key, "opened queue");
                    Ok(Box::new(reader))
                }
                Slot::Opened => Err(ChannelError::AlreadyOpen(key)),
            },
        }
    }
}
