//! Thread-safe, insertion-ordered storage of client handles.

use std::sync::{Arc, Mutex, PoisonError};

use crate::client::{ClientHandle, ClientKey};
use crate::error::{ServerError, ServerResult};

/// Registry of live client handles, ordered by insertion.
///
/// Semantically a mapping from client key (socket descriptor) to
/// handle. A single internal lock serialises every modification;
/// consumers that need to do I/O take a snapshot first so no lock is
/// held across socket operations.
#[derive(Debug, Default)]
pub(crate) struct ClientRegistry {
    clients: Mutex<Vec<Arc<ClientHandle>>>,
}

impl ClientRegistry {
    /// Appends a handle at the tail.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidArgument`] when a handle with the
    /// same key is already stored; keys are unique for all reachable
    /// states.
    pub(crate) fn append(&self, handle: Arc<ClientHandle>) -> ServerResult<()> {
        let mut clients = self.lock()?;
        if clients.iter().any(|c| c.key() == handle.key()) {
            return Err(ServerError::InvalidArgument(format!(
                "client key {} already registered",
                handle.key()
            )));
        }
        clients.push(handle);
        Ok(())
    }

    /// Removes and returns the handle with the given key. An absent
    /// key is a no-op.
    pub(crate) fn remove(&self, key: ClientKey) -> Option<Arc<ClientHandle>> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let index = clients.iter().position(|c| c.key() == key)?;
        Some(clients.remove(index))
    }

    /// Copies the current handles in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ClientHandle>> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `f` to each stored handle under the registry lock,
    /// stopping at the first error and returning it.
    pub(crate) fn traverse(
        &self,
        mut f: impl FnMut(&Arc<ClientHandle>) -> ServerResult<()>,
    ) -> ServerResult<()> {
        let clients = self.lock()?;
        for client in clients.iter() {
            f(client)?;
        }
        Ok(())
    }

    /// Current number of stored handles.
    pub(crate) fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops every stored handle.
    pub(crate) fn clear(&self) {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn lock(&self) -> ServerResult<std::sync::MutexGuard<'_, Vec<Arc<ClientHandle>>>> {
        self.clients
            .lock()
            .map_err(|_| ServerError::Synchronization("client registry lock poisoned".to_string()))
    }
}
