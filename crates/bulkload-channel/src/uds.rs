use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::traits::{Channel, ChannelOpener, IpcStream};

/// Socket-backed channel, writer side.
///
/// The writer process binds `<dir>/bulkload-<key>.sock` and accepts the loader,
/// which connects through [`SocketDirectory`] using the same key. The socket
/// file is removed on `Drop` if it is still the one this listener created.
pub struct SocketQueue {
    listener: UnixListener,
    key: u32,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl SocketQueue {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Socket path used for `key` under `dir`.
    pub fn socket_path(dir: impl AsRef<Path>, key: u32) -> PathBuf {
        dir.as_ref().join(format!("bulkload-{key}.sock"))
    }

    /// Bind the channel for `key` under `dir` with default configuration.
    pub fn bind(dir: impl AsRef<Path>, key: u32) -> Result<Self> {
        Self::bind_with_config(dir, key, &ChannelConfig::default())
    }

    /// Bind the channel for `key` under `dir`.
    ///
    /// A stale socket left at the path is removed first; any other existing
    /// file is an error.
    pub fn bind_with_config(dir: impl AsRef<Path>, key: u32, config: &ChannelConfig) -> Result<Self> {
        let path = Self::socket_path(dir, key);

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(ChannelError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| ChannelError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale channel socket");
                std::fs::remove_file(&path).map_err(|e| ChannelError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(ChannelError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| ChannelError::Bind {
            path: path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(config.socket_mode))
            .map_err(|e| ChannelError::Bind {
                path: path.clone(),
                source: e,
            })?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| ChannelError::Bind {
            path: path.clone(),
            source: e,
        })?;

        info!(key, ?path, "channel socket bound");

        Ok(Self {
            listener,
            key,
            path,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Accept the loader connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) = self.listener.accept().map_err(ChannelError::Accept)?;
        debug!(key = self.key, "loader connected");
        Ok(IpcStream::from_unix(stream))
    }

    /// Key this channel is bound to.
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Path of the bound socket.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketQueue {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "removing channel socket");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

/// Loader-side opener for socket channels living in one directory.
#[derive(Debug, Clone)]
pub struct SocketDirectory {
    dir: PathBuf,
}

impl SocketDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ChannelOpener for SocketDirectory {
    fn open(&self, key: u32) -> Result<Box<dyn Channel>> {
        let path = SocketQueue::socket_path(&self.dir, key);
        let stream =
            std::os::unix::net::UnixStream::connect(&path).map_err(|e| ChannelError::Connect {
                path: path.clone(),
                source: e,
            })?;
        debug!(key, ?path, "connected to channel socket");
        Ok(Box::new(IpcStream::from_unix(stream)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bulkload-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn bind_accept_open_by_key() {
        let dir = temp_dir("uds-open");
        let queue = SocketQueue::bind(&dir, 42).unwrap();
        assert!(queue.path().exists());
        assert_eq!(queue.key(), 42);

        let opener = SocketDirectory::new(&dir);
        let handle = std::thread::spawn(move || {
            let mut channel = opener.open(42).unwrap();
            let mut buf = [0u8; 5];
            let n = channel.read_full(&mut buf).unwrap();
            assert_eq!(&buf[..n], b"hello");
        });

        let mut stream = queue.accept().unwrap();
        stream.write_all(b"hello").unwrap();
        drop(stream);
        handle.join().unwrap();

        let path = queue.path().to_path_buf();
        drop(queue);
        assert!(!path.exists(), "socket file should be removed on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_unbound_key_fails() {
        let dir = temp_dir("uds-missing");
        let opener = SocketDirectory::new(&dir);
        assert!(matches!(opener.open(9), Err(ChannelError::Connect { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_too_long_rejected() {
        let long_dir = PathBuf::from("/tmp/").join("a".repeat(200));
        let result = SocketQueue::bind(&long_dir, 1);
        assert!(matches!(result, Err(ChannelError::PathTooLong { .. })));
    }

    #[test]
    fn bind_default_permissions_hardened() {
        let dir = temp_dir("uds-perms");
        let queue = SocketQueue::bind(&dir, 3).unwrap();
        let mode = std::fs::metadata(queue.path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        drop(queue);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bind_rejects_existing_non_socket_file() {
        let dir = temp_dir("uds-file");
        std::fs::write(SocketQueue::socket_path(&dir, 5), b"regular-file").unwrap();
        let result = SocketQueue::bind(&dir, 5);
        assert!(matches!(result, Err(ChannelError::Bind { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
