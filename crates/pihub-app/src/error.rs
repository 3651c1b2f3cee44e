//! Application error types.

use thiserror::Error;

use crate::sysstat::StatsError;

/// Result type for app controller operations.
pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the app controller and its components.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] pihub_config::ConfigError),

    #[error("server failure: {0}")]
    Server(#[from] pihub_server::ServerError),

    #[error("dispatcher failure: {0}")]
    Dispatch(#[from] pihub_dispatch::DispatchError),

    #[error("hardware failure: {0}")]
    Hardware(#[from] pihub_hw::HwError),

    #[error("host statistics failure: {0}")]
    Stats(#[from] StatsError),

    #[error("the hub is already running")]
    AlreadyRunning,

    #[error("the hub has not been started")]
    NotStarted,
}
