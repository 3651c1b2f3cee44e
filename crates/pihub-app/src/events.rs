//! Server callback wiring: from wire bytes to dispatched commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use pihub_dispatch::{DispatchError, Dispatcher};
use pihub_server::{ClientHandle, Server, ServerError, ServerEvents};
use tracing::{debug, error, warn};

use crate::reply::{
    self, ReplyKind, CMD_ERR_MSG, CMD_INCOMPLETE_MSG, CONNECT_SUFFIX, DISCONNECT_MSG,
    GENERIC_FAILURE_MSG, WELCOME_MSG,
};
use crate::{App, AppInner, CommandContext, HubState};

/// Grace period before a failed server is rebuilt from scratch.
const RESTART_DELAY: Duration = Duration::from_secs(10);

/// The hub's [`ServerEvents`] implementation.
///
/// Welcomes and announces clients, feeds received lines to the
/// dispatcher, and reacts to a catastrophic server failure with a
/// full stop-deinit-init-run cycle on a recovery thread.
pub(crate) struct HubEvents {
    dispatcher: Dispatcher<CommandContext>,
    hub: Arc<HubState>,
    recv_buffer: usize,
    app: Mutex<Weak<AppInner>>,
    recovering: Arc<AtomicBool>,
}

impl HubEvents {
    pub(crate) fn new(
        dispatcher: Dispatcher<CommandContext>,
        hub: Arc<HubState>,
        recv_buffer: usize,
    ) -> Self {
        Self {
            dispatcher,
            hub,
            recv_buffer,
            app: Mutex::new(Weak::new()),
            recovering: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Late-binds the app controller; the events object is created
    /// before the controller that owns it.
    pub(crate) fn attach(&self, app: Weak<AppInner>) {
        *self.app.lock().unwrap_or_else(PoisonError::into_inner) = app;
    }

    fn dispatch_line(&self, server: &Server, client: &Arc<ClientHandle>, line: &str) {
        let ctx = CommandContext {
            server: server.clone(),
            client: Arc::clone(client),
            hub: Arc::clone(&self.hub),
        };

        match self.dispatcher.execute(line, &ctx) {
            Ok(()) => {}
            Err(DispatchError::CmdIncomplete) => {
                reply::send(server, client, ReplyKind::Error, CMD_INCOMPLETE_MSG);
            }
            Err(
                DispatchError::BufTooLong
                | DispatchError::BufEmpty
                | DispatchError::TokenTooLong
                | DispatchError::CmdNotFound,
            ) => {
                reply::send(server, client, ReplyKind::Error, CMD_ERR_MSG);
            }
            Err(e) => {
                warn!(error = %e, "command dispatch failed");
                reply::send(server, client, ReplyKind::Error, GENERIC_FAILURE_MSG);
            }
        }
    }
}

impl ServerEvents for HubEvents {
    /// Welcome the new client and notify everyone else.
    fn on_client_connect(&self, server: &Server, client: &Arc<ClientHandle>) {
        debug!(client = client.key(), "client connect");

        reply::send(server, client, ReplyKind::Info, WELCOME_MSG);

        let ip = server
            .client_address(client)
            .unwrap_or_else(|_| "unknown".to_string());
        reply::broadcast(server, ReplyKind::Info, &format!("{ip}{CONNECT_SUFFIX}"));
    }

    /// Read the pending bytes and dispatch each complete line.
    fn on_data_received(&self, server: &Server, client: &Arc<ClientHandle>) {
        let mut buf = vec![0u8; self.recv_buffer];
        match server.read(client, &mut buf) {
            Ok(0) => {}
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                for line in text.lines() {
                    self.dispatch_line(server, client, line);
                }
            }
            // The worker observes the closed socket on its next peek
            // and runs the teardown path.
            Err(ServerError::ClientDisconnected) => {
                debug!(client = client.key(), "peer closed during read");
            }
            Err(e) => warn!(client = client.key(), error = %e, "read failed"),
        }
    }

    /// Notify the remaining clients about the departure.
    fn on_client_disconnect(&self, server: &Server, client: &Arc<ClientHandle>) {
        debug!(client = client.key(), "client disconnect");
        reply::broadcast(server, ReplyKind::Info, DISCONNECT_MSG);
    }

    /// Attempt a full stop-deinit-init-run recovery cycle.
    ///
    /// Runs on a separate thread: the failure callback fires on the
    /// listener or a worker thread, and deinit joins those threads.
    fn on_server_failure(&self, _server: &Server, error: &ServerError) {
        error!(error = %error, "server failure reported");

        if self.recovering.swap(true, Ordering::SeqCst) {
            return; // a recovery cycle is already scheduled
        }
        let app = self
            .app
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let recovering = Arc::clone(&self.recovering);

        let spawned = thread::Builder::new()
            .name("pihub-recovery".to_string())
            .spawn(move || {
                thread::sleep(RESTART_DELAY);
                if let Some(inner) = app.upgrade() {
                    App::from_inner(inner).restart();
                }
                recovering.store(false, Ordering::SeqCst);
            });
        if let Err(e) = spawned {
            self.recovering.store(false, Ordering::SeqCst);
            error!(error = %e, "failed to spawn recovery thread");
        }
    }
}
