//! Hardware error types.

use thiserror::Error;

/// Result type for hardware operations.
pub type HwResult<T> = Result<T, HwError>;

/// Errors that can occur while talking to the board peripherals.
#[derive(Debug, Error)]
pub enum HwError {
    /// An out-of-range or otherwise unusable argument from the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device file or sysfs I/O failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not identify itself as expected.
    #[error("device at {addr:#04x} returned id {found:#04x}, expected {expected:#04x}")]
    UnexpectedDeviceId { addr: u8, found: u8, expected: u8 },

    /// A GPIO line could not be driven or read.
    #[error("gpio line {line}: {reason}")]
    Gpio { line: u8, reason: String },

    /// A bus or peripheral lock was poisoned.
    #[error("hardware lock poisoned")]
    LockPoisoned,
}
