//! Dispatcher error types.

use thiserror::Error;

use crate::MAX_INPUT;

/// Result type for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while registering or executing commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// An out-of-range or otherwise unusable argument from the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested command slot is already populated.
    #[error("command slot {0} is already taken")]
    IdAlreadyTaken(usize),

    /// No registered command matches the parsed target and action.
    #[error("no command matches the given target and action")]
    CmdNotFound,

    /// The input carried a target but no action token.
    #[error("command is incomplete (missing action token)")]
    CmdIncomplete,

    /// The input was empty or contained only delimiter bytes.
    #[error("input buffer is empty")]
    BufEmpty,

    /// The input exceeded the maximum accepted length.
    #[error("input buffer exceeds {MAX_INPUT} bytes")]
    BufTooLong,

    /// A single token exceeded its maximum length.
    #[error("token exceeds its maximum length")]
    TokenTooLong,

    /// More arguments than a command may carry.
    #[error("too many arguments in command")]
    TooManyArgs,

    /// The dispatcher lock was poisoned by a panicking handler.
    #[error("dispatcher lock poisoned")]
    LockPoisoned,
}
