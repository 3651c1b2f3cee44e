//! Server façade, listener task and per-client worker tasks.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Socket, Type};
use tracing::{debug, error, info, warn};

use crate::client::{ClientHandle, ClientInfo};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::events::ServerEvents;
use crate::gate::WorkerGate;
use crate::registry::ClientRegistry;

// Listener poll tokens.
const LISTENER_TOKEN: Token = Token(0);
const SHUTDOWN_TOKEN: Token = Token(1);

// Worker poll tokens (each worker owns its own poll instance).
const CLIENT_TOKEN: Token = Token(0);
const WAKE_TOKEN: Token = Token(1);

/// Lifecycle of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Socket bound, no tasks running.
    Initialized,
    /// Listener accepting; workers serving.
    Running,
    /// Shutdown signalled; tasks draining.
    Quiescing,
    /// Resources released; terminal.
    Deinitialized,
}

/// State guarded by the server lock.
struct Lifecycle {
    state: State,
    /// Bound but not yet listening; consumed by `run`.
    socket: Option<Socket>,
    shutdown_waker: Option<Waker>,
    listener_thread: Option<JoinHandle<()>>,
}

struct ServerInner {
    config: ServerConfig,
    events: Arc<dyn ServerEvents>,
    local_addr: SocketAddr,
    lifecycle: Mutex<Lifecycle>,
    registry: ClientRegistry,
    gate: WorkerGate,
    workers: Mutex<Vec<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl ServerInner {
    fn lifecycle(&self) -> ServerResult<MutexGuard<'_, Lifecycle>> {
        self.lifecycle
            .lock()
            .map_err(|_| ServerError::Synchronization("server lock poisoned".to_string()))
    }
}

/// Multi-client TCP command server.
///
/// Cheap to clone; all clones refer to the same instance. Lifecycle:
/// [`Server::init`] binds the socket, [`Server::run`] starts the
/// listener task, [`Server::shutdown`] disconnects every client and
/// stops the listener, [`Server::deinit`] waits for all tasks to exit
/// and releases the remaining resources.
///
/// One native thread serves the listener and one serves each client;
/// there is no cooperative runtime. All blocking waits are kernel
/// readiness waits or lock acquisition.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Validates the configuration and binds the listening socket
    /// (with address reuse); no network activity starts until `run`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for bad limits or a non-IPv4 address,
    /// `Network` for socket and bind failures.
    pub fn init(config: ServerConfig, events: Arc<dyn ServerEvents>) -> ServerResult<Self> {
        config.validate()?;

        let socket = Socket::new(Domain::IPV4, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&config.bind_addr.into())?;
        let local_addr = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| ServerError::InvalidArgument("bind address is not inet".to_string()))?;

        debug!(addr = %local_addr, "server socket created");

        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                events,
                local_addr,
                lifecycle: Mutex::new(Lifecycle {
                    state: State::Initialized,
                    socket: Some(socket),
                    shutdown_waker: None,
                    listener_thread: None,
                }),
                registry: ClientRegistry::default(),
                gate: WorkerGate::default(),
                workers: Mutex::new(Vec::new()),
                dropped: AtomicU64::new(0),
            }),
        })
    }

    fn from_inner(inner: Arc<ServerInner>) -> Self {
        Self { inner }
    }

    /// Starts accepting connections and returns once the listener
    /// task is running. Not idempotent.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` unless the instance is freshly initialized;
    /// `Network`/`Multiplexor` for listen and poll setup failures.
    pub fn run(&self) -> ServerResult<()> {
        let mut lc = self.inner.lifecycle()?;
        match lc.state {
            State::Initialized => {}
            State::Running | State::Quiescing => return Err(ServerError::AlreadyRunning),
            State::Deinitialized => {
                return Err(ServerError::InvalidArgument(
                    "server has been deinitialized".to_string(),
                ));
            }
        }

        let socket = lc.socket.take().ok_or_else(|| {
            ServerError::Synchronization("listening socket already consumed".to_string())
        })?;
        socket.listen(self.inner.config.max_pending as i32)?;
        socket.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(socket.into());

        let poll = Poll::new().map_err(ServerError::Multiplexor)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(ServerError::Multiplexor)?;
        let waker = Waker::new(poll.registry(), SHUTDOWN_TOKEN)
            .map_err(|e| ServerError::Synchronization(format!("wake descriptor failure: {e}")))?;

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("pihub-listener".to_string())
            .spawn(move || listener_loop(&inner, poll, listener))
            .map_err(|e| ServerError::Synchronization(format!("thread spawn failure: {e}")))?;

        lc.shutdown_waker = Some(waker);
        lc.listener_thread = Some(handle);
        lc.state = State::Running;
        info!(addr = %self.inner.local_addr, "server listening");
        Ok(())
    }

    /// Receives up to `buf.len()` bytes from the client under its I/O
    /// lock.
    ///
    /// Returns `Ok(0)` when the socket has no data available
    /// (would-block). Returns [`ServerError::ClientDisconnected`] on
    /// end-of-stream or a non-retryable receive error; the client is
    /// not closed by this call; its worker performs the teardown.
    pub fn read(&self, client: &ClientHandle, buf: &mut [u8]) -> ServerResult<usize> {
        client.read_some(buf)
    }

    /// Sends all of `data` to the client under its I/O lock, looping
    /// over partial sends.
    pub fn write(&self, client: &ClientHandle, data: &[u8]) -> ServerResult<()> {
        client.write_all(data)
    }

    /// Sends `data` to every registered client in insertion order.
    ///
    /// The registry lock is not held during the writes; clients added
    /// mid-broadcast may or may not receive the message. An error on
    /// one client terminates the broadcast and is returned; later
    /// clients are not attempted. (A policy that continues past
    /// failed peers would arguably suit a hub better; kept as is
    /// deliberately, see DESIGN.md.)
    pub fn broadcast(&self, data: &[u8]) -> ServerResult<()> {
        for client in self.inner.registry.snapshot() {
            client.write_all(data)?;
        }
        Ok(())
    }

    /// Requests a forced disconnect of the client by signalling its
    /// wake descriptor. Returns promptly; the worker performs the
    /// actual teardown on its next wakeup. With `suppress_callback`
    /// set the worker skips `on_client_disconnect`, which avoids
    /// re-entry into broadcast paths during shutdown.
    pub fn disconnect(&self, client: &ClientHandle, suppress_callback: bool) -> ServerResult<()> {
        if suppress_callback {
            client.suppress_disconnect_callback();
        }
        client.wake()
    }

    /// Disconnects every client (callbacks suppressed) and signals the
    /// listener to exit. Returns once the signals are delivered; the
    /// listener and worker tasks terminate asynchronously and are
    /// joined by [`Server::deinit`].
    pub fn shutdown(&self) -> ServerResult<()> {
        let mut lc = self.inner.lifecycle()?;
        if lc.state != State::Running {
            return Err(ServerError::NotStarted);
        }

        self.inner.registry.traverse(|client| {
            client.suppress_disconnect_callback();
            client.wake()
        })?;

        // The waker stays in the lifecycle state until deinit: its
        // wake descriptor must outlive the listener's poll.
        lc.shutdown_waker
            .as_ref()
            .ok_or_else(|| ServerError::Synchronization("shutdown waker missing".to_string()))?
            .wake()
            .map_err(|e| ServerError::Synchronization(format!("wake descriptor failure: {e}")))?;

        lc.state = State::Quiescing;
        info!("server shutdown signalled");
        Ok(())
    }

    /// Releases the instance: waits for every worker to exit, joins
    /// the listener thread and destroys the registry.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` when called on a running instance; call
    /// [`Server::shutdown`] first.
    pub fn deinit(&self) -> ServerResult<()> {
        let listener_thread = {
            let mut lc = self.inner.lifecycle()?;
            match lc.state {
                State::Running => return Err(ServerError::AlreadyRunning),
                State::Deinitialized => return Ok(()),
                State::Initialized | State::Quiescing => {}
            }
            lc.state = State::Deinitialized;
            lc.socket = None;
            lc.listener_thread.take()
        };

        // Join barrier: no worker survives deinit.
        self.inner.gate.wait_idle();
        if let Some(handle) = listener_thread {
            if handle.join().is_err() {
                warn!("listener thread panicked");
            }
        }
        // Safe to release the wake descriptor now that the listener
        // can no longer be waiting on it.
        self.inner.lifecycle()?.shutdown_waker = None;
        let workers = {
            let mut workers = self
                .inner
                .workers
                .lock()
                .map_err(|_| ServerError::Synchronization("worker list lock poisoned".to_string()))?;
            std::mem::take(&mut *workers)
        };
        for worker in workers {
            if worker.join().is_err() {
                warn!("client worker thread panicked");
            }
        }

        self.inner.registry.clear();
        info!("server deinitialized");
        Ok(())
    }

    /// The client's peer endpoint formatted as a dotted IPv4 address.
    pub fn client_address(&self, client: &ClientHandle) -> ServerResult<String> {
        match client.peer_addr() {
            SocketAddr::V4(addr) => Ok(addr.ip().to_string()),
            SocketAddr::V6(_) => Err(ServerError::Network(io::Error::new(
                io::ErrorKind::Unsupported,
                "peer is not an IPv4 endpoint",
            ))),
        }
    }

    /// Copied snapshot of the registered clients in insertion order.
    pub fn clients(&self) -> Vec<ClientInfo> {
        self.inner
            .registry
            .snapshot()
            .iter()
            .map(|c| c.info())
            .collect()
    }

    /// Number of currently registered clients.
    pub fn client_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// The address the listening socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Connections closed straight after accept because the client
    /// limit was reached.
    pub fn dropped_connections(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.inner.local_addr)
            .field("clients", &self.inner.registry.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Listener task
// ---------------------------------------------------------------------------

fn listener_loop(inner: &Arc<ServerInner>, mut poll: Poll, listener: TcpListener) {
    let server = Server::from_inner(Arc::clone(inner));
    let mut events = Events::with_capacity(8);

    'listen: loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            let err = ServerError::Multiplexor(e);
            error!(error = %err, "listener poll failed");
            inner.events.on_server_failure(&server, &err);
            break 'listen;
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    if let Err(err) = accept_ready(inner, &server, &listener) {
                        error!(error = %err, "accept path failed");
                        inner.events.on_server_failure(&server, &err);
                        break 'listen;
                    }
                }
                SHUTDOWN_TOKEN => {
                    debug!("shutdown wake received");
                    break 'listen;
                }
                _ => {}
            }
        }
    }

    // Dropping the listener and poll closes the listening socket and
    // the multiplexor; no new workers are spawned past this point.
    // The shutdown wake descriptor is released here as well, so a
    // quiesced instance holds no open descriptors.
    if let Ok(mut lc) = inner.lifecycle.lock() {
        lc.shutdown_waker = None;
    }
    info!("listener task exiting");
}

/// Drains the accept queue; mio readiness is edge-triggered, so every
/// pending connection must be accepted before polling again.
fn accept_ready(
    inner: &Arc<ServerInner>,
    server: &Server,
    listener: &TcpListener,
) -> ServerResult<()> {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => admit(inner, server, stream, peer_addr)?,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(ServerError::Network(e)),
        }
    }
}

fn admit(
    inner: &Arc<ServerInner>,
    server: &Server,
    mut stream: TcpStream,
    peer_addr: SocketAddr,
) -> ServerResult<()> {
    // Admission control: over the limit the socket is closed
    // immediately and counted, not treated as an error.
    if inner.registry.len() >= inner.config.max_clients {
        inner.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(%peer_addr, max_clients = inner.config.max_clients, "client limit reached, dropping connection");
        return Ok(());
    }

    let poll = Poll::new().map_err(ServerError::Multiplexor)?;
    poll.registry()
        .register(&mut stream, CLIENT_TOKEN, Interest::READABLE)
        .map_err(ServerError::Multiplexor)?;
    let waker = Waker::new(poll.registry(), WAKE_TOKEN)
        .map_err(|e| ServerError::Synchronization(format!("wake descriptor failure: {e}")))?;

    let handle = Arc::new(ClientHandle::new(stream, waker, peer_addr));
    let key = handle.key();

    // The handle must be in the registry before the connect callback
    // fires and before the worker starts serving.
    inner.registry.append(Arc::clone(&handle))?;

    inner.gate.enter();
    let spawned = thread::Builder::new().name(format!("pihub-client-{key}")).spawn({
        let inner = Arc::clone(inner);
        let handle = Arc::clone(&handle);
        move || worker_loop(&inner, &handle, poll)
    });
    let join_handle = match spawned {
        Ok(join_handle) => join_handle,
        Err(e) => {
            inner.gate.leave();
            inner.registry.remove(key);
            return Err(ServerError::Synchronization(format!(
                "thread spawn failure: {e}"
            )));
        }
    };

    {
        let mut workers = inner
            .workers
            .lock()
            .map_err(|_| ServerError::Synchronization("worker list lock poisoned".to_string()))?;
        // Reap threads that already finished so the list stays small.
        let mut index = 0;
        while index < workers.len() {
            if workers[index].is_finished() {
                let _ = workers.swap_remove(index).join();
            } else {
                index += 1;
            }
        }
        workers.push(join_handle);
    }

    info!(client = key, %peer_addr, "client connected");
    inner.events.on_client_connect(server, &handle);
    Ok(())
}

// ---------------------------------------------------------------------------
// Client worker task
// ---------------------------------------------------------------------------

/// Why a worker is tearing its client down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// The peer closed the connection or the socket failed.
    Peer,
    /// The wake descriptor was signalled (disconnect or shutdown).
    Forced,
    /// The worker itself hit an unrecoverable multiplexor error.
    Failure,
}

fn worker_loop(inner: &Arc<ServerInner>, handle: &Arc<ClientHandle>, mut poll: Poll) {
    let server = Server::from_inner(Arc::clone(inner));
    let mut events = Events::with_capacity(4);

    let reason = 'serve: loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            let err = ServerError::Multiplexor(e);
            error!(client = handle.key(), error = %err, "worker poll failed");
            inner.events.on_server_failure(&server, &err);
            break 'serve Teardown::Failure;
        }

        for event in events.iter() {
            match event.token() {
                CLIENT_TOKEN => {
                    if drain_readable(inner, &server, handle) == ClientStatus::Closed {
                        break 'serve Teardown::Peer;
                    }
                }
                WAKE_TOKEN => {
                    debug!(client = handle.key(), "disconnect wake received");
                    break 'serve Teardown::Forced;
                }
                _ => {}
            }
        }
    };

    teardown(inner, &server, handle, reason);
    // The poll (and with it the wake descriptor registration) is
    // dropped here; the socket itself closes with the last handle
    // reference.
    drop(poll);
}

/// Outcome of serving one readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientStatus {
    /// The socket would block again; keep serving.
    Open,
    /// The peer closed the connection or the socket failed.
    Closed,
}

/// Serves one readiness event. Readiness is edge-triggered, so the
/// callback is re-invoked until a peek reports no pending data. The
/// peek never consumes, so `on_data_received` always precedes the
/// read for the same bytes.
fn drain_readable(
    inner: &Arc<ServerInner>,
    server: &Server,
    handle: &Arc<ClientHandle>,
) -> ClientStatus {
    let mut probe = [0u8; 1];
    loop {
        match handle.peek(&mut probe) {
            // Zero-byte peek: the peer closed its end.
            Ok(0) => return ClientStatus::Closed,
            Ok(_) => inner.events.on_data_received(server, handle),
            Err(ServerError::Network(ref e)) if e.kind() == io::ErrorKind::WouldBlock => {
                return ClientStatus::Open;
            }
            Err(ServerError::Network(ref e)) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(_) => return ClientStatus::Closed,
        }
    }
}

fn teardown(
    inner: &Arc<ServerInner>,
    server: &Server,
    handle: &Arc<ClientHandle>,
    reason: Teardown,
) {
    let key = handle.key();

    // Sends FIN to the peer even while concurrent façade calls still
    // hold references to the handle.
    handle.close();
    inner.registry.remove(key);

    let fire_callback = match reason {
        Teardown::Peer | Teardown::Forced => !handle.disconnect_callback_suppressed(),
        Teardown::Failure => false,
    };
    if fire_callback {
        inner.events.on_client_disconnect(server, handle);
    }

    info!(client = key, ?reason, "client disconnected");
    inner.gate.leave();
}
