//! Server configuration.

use std::net::SocketAddr;

use crate::error::{ServerError, ServerResult};

/// Configuration for a [`Server`](crate::Server) instance.
///
/// Immutable once passed to `Server::init`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listening socket binds to. Port 0 asks the OS for
    /// an ephemeral port; the bound address is available through
    /// `Server::local_addr` afterwards.
    pub bind_addr: SocketAddr,
    /// Hard limit on concurrently accepted clients; excess
    /// connections are closed immediately after accept.
    pub max_clients: usize,
    /// Backlog of pending connection requests passed to `listen`.
    pub max_pending: u32,
}

impl ServerConfig {
    /// Default client limit, matching a small single-board hub.
    pub const DEFAULT_MAX_CLIENTS: usize = 5;
    /// Default listen backlog.
    pub const DEFAULT_MAX_PENDING: u32 = 10;

    /// Creates a configuration with default limits.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_clients: Self::DEFAULT_MAX_CLIENTS,
            max_pending: Self::DEFAULT_MAX_PENDING,
        }
    }

    /// Sets the maximum number of concurrent clients.
    #[must_use]
    pub fn with_max_clients(mut self, max_clients: usize) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Sets the listen backlog.
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: u32) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub(crate) fn validate(&self) -> ServerResult<()> {
        if self.max_clients == 0 {
            return Err(ServerError::InvalidArgument(
                "max_clients must be positive".to_string(),
            ));
        }
        if self.max_pending == 0 {
            return Err(ServerError::InvalidArgument(
                "max_pending must be positive".to_string(),
            ));
        }
        if !self.bind_addr.is_ipv4() {
            return Err(ServerError::InvalidArgument(
                "only IPv4 bind addresses are supported".to_string(),
            ));
        }
        Ok(())
    }
}
