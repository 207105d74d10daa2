/// Default in-process queue capacity: 64 KiB.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64 * 1024;

/// Controls channel creation on the writer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Capacity in bytes of in-process queues. Writers block once it is reached.
    pub queue_capacity: usize,
    /// Permission mode applied to socket paths.
    pub socket_mode: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            socket_mode: 0o600,
        }
    }
}
