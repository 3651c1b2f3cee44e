//! Per-client connection handle.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::Waker;
use mio::net::TcpStream;
use tracing::trace;

use crate::error::{ServerError, ServerResult};

/// Identity of a connected client: the value of its socket descriptor.
pub type ClientKey = RawFd;

/// Copied per-client record returned by [`Server::clients`](crate::Server::clients).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// The client's registry key (socket descriptor value).
    pub key: ClientKey,
    /// The client's peer address as observed at accept time.
    pub peer_addr: SocketAddr,
}

/// The record identifying one connected peer.
///
/// Owns the client socket behind the per-client I/O lock, the wake
/// descriptor its worker watches, and the peer address cached at
/// accept time. Handles are shared as `Arc`s between the registry,
/// the worker thread and in-flight façade calls; the socket and the
/// lock are released only when the last reference is dropped, so a
/// concurrent broadcast can never observe a destroyed lock.
pub struct ClientHandle {
    key: ClientKey,
    peer_addr: SocketAddr,
    io: Mutex<TcpStream>,
    waker: Waker,
    suppress_disconnect: AtomicBool,
}

impl ClientHandle {
    pub(crate) fn new(stream: TcpStream, waker: Waker, peer_addr: SocketAddr) -> Self {
        Self {
            key: stream.as_raw_fd(),
            peer_addr,
            io: Mutex::new(stream),
            waker,
            suppress_disconnect: AtomicBool::new(false),
        }
    }

    /// The client's registry key.
    pub fn key(&self) -> ClientKey {
        self.key
    }

    /// The peer address observed at accept time.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Copied `{key, peer_addr}` record for enumeration snapshots.
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            key: self.key,
            peer_addr: self.peer_addr,
        }
    }

    fn io_lock(&self) -> ServerResult<std::sync::MutexGuard<'_, TcpStream>> {
        self.io
            .lock()
            .map_err(|_| ServerError::Synchronization("client I/O lock poisoned".to_string()))
    }

    /// Peeks at the socket without consuming data.
    ///
    /// `Ok(0)` means the peer closed the connection.
    pub(crate) fn peek(&self, buf: &mut [u8]) -> ServerResult<usize> {
        let stream = self.io_lock()?;
        stream.peek(buf).map_err(ServerError::Network)
    }

    /// Receives up to `buf.len()` bytes under the I/O lock.
    ///
    /// Would-block is reported as `Ok(0)`; end-of-stream and
    /// non-retryable errors as [`ServerError::ClientDisconnected`].
    pub(crate) fn read_some(&self, buf: &mut [u8]) -> ServerResult<usize> {
        let mut stream = self.io_lock()?;
        loop {
            match stream.read(buf) {
                Ok(0) if buf.is_empty() => return Ok(0),
                Ok(0) => return Err(ServerError::ClientDisconnected),
                Ok(n) => {
                    trace!(client = self.key, bytes = n, "received");
                    return Ok(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return Err(ServerError::ClientDisconnected),
            }
        }
    }

    /// Sends all of `data` under the I/O lock, looping over partial
    /// sends. The socket is non-blocking, so a full send buffer is
    /// retried after yielding rather than reported to the caller.
    pub(crate) fn write_all(&self, data: &[u8]) -> ServerResult<()> {
        let mut stream = self.io_lock()?;
        let mut written = 0;
        while written < data.len() {
            match stream.write(&data[written..]) {
                Ok(0) => {
                    return Err(ServerError::Network(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket closed mid-write",
                    )));
                }
                Ok(n) => written += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ServerError::Network(e)),
            }
        }
        trace!(client = self.key, bytes = written, "sent");
        Ok(())
    }

    /// Signals the client's wake descriptor; the worker observes it on
    /// its next multiplexor wakeup and tears the connection down.
    pub(crate) fn wake(&self) -> ServerResult<()> {
        self.waker
            .wake()
            .map_err(|e| ServerError::Synchronization(format!("wake descriptor failure: {e}")))
    }

    pub(crate) fn suppress_disconnect_callback(&self) {
        self.suppress_disconnect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn disconnect_callback_suppressed(&self) -> bool {
        self.suppress_disconnect.load(Ordering::SeqCst)
    }

    /// Shuts the socket down in both directions so the peer observes
    /// end-of-stream even while other references keep the fd alive.
    pub(crate) fn close(&self) {
        if let Ok(stream) = self.io.lock() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("key", &self.key)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}
