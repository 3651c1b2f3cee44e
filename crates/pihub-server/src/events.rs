//! Callback surface wired by the application layer.

use std::sync::Arc;

use crate::client::ClientHandle;
use crate::error::ServerError;
use crate::server::Server;

/// Event callbacks for the serving path.
///
/// All four callbacks are mandatory. They are invoked from the
/// listener and worker threads, so implementations must be
/// thread-safe, and they receive the server façade so they can call
/// back into `read`, `write`, `broadcast` or `disconnect`.
///
/// Invocation ordering guarantees:
///
/// - `on_client_connect` observes the new handle already present in
///   the registry, so it may immediately `write` to or `broadcast`
///   about the client.
/// - `on_data_received` fires before any `read` for the same
///   readiness event; the implementation is expected to perform the
///   read.
/// - `on_client_disconnect` is the last observable effect for a
///   client and fires after the handle has left the registry. It is
///   skipped for forced disconnects that requested suppression.
/// - `on_server_failure` fires on a background task that hit an
///   unrecoverable error; the task terminates afterwards. The
///   implementation may restart the server.
pub trait ServerEvents: Send + Sync {
    /// A new client finished the accept path.
    fn on_client_connect(&self, server: &Server, client: &Arc<ClientHandle>);

    /// The client's socket became readable.
    fn on_data_received(&self, server: &Server, client: &Arc<ClientHandle>);

    /// The client disconnected on its own initiative (or was forced
    /// off without callback suppression).
    fn on_client_disconnect(&self, server: &Server, client: &Arc<ClientHandle>);

    /// A background task failed unrecoverably.
    fn on_server_failure(&self, server: &Server, error: &ServerError);
}
