//! Server error types.

use std::io;

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur during server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// An out-of-range or otherwise unusable argument from the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lifecycle violation: the operation requires a stopped server.
    #[error("server is already running")]
    AlreadyRunning,

    /// Lifecycle violation: the operation requires a running server.
    #[error("server has not been started")]
    NotStarted,

    /// Socket or address failure.
    #[error("network failure: {0}")]
    Network(#[from] io::Error),

    /// Readiness-multiplexor setup or wait failed.
    #[error("readiness poll failure: {0}")]
    Multiplexor(io::Error),

    /// Lock or wake-descriptor failure.
    #[error("synchronization failure: {0}")]
    Synchronization(String),

    /// Client storage exhausted.
    #[error("client storage exhausted")]
    Exhausted,

    /// End-of-stream observed on a client socket.
    #[error("client disconnected")]
    ClientDisconnected,
}
