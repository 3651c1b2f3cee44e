//! GPIO line control through the sysfs character interface.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, trace};

use crate::error::{HwError, HwResult};

const SYSFS_GPIO_BASE: &str = "/sys/class/gpio";

/// Logic level of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Parses `0`/`1` as written by the kernel's `value` attribute.
    fn from_sysfs(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Self::Low),
            b'1' => Some(Self::High),
            _ => None,
        }
    }

    fn as_sysfs(self) -> &'static [u8] {
        match self {
            Self::Low => b"0",
            Self::High => b"1",
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Driver for the board's GPIO lines.
///
/// Lines are exported on first use and re-driven on every call, the
/// way the hub commands expect (`set` requests the line as an output,
/// `get` as an input). One internal lock serialises the
/// export/direction/value sequences.
#[derive(Debug)]
pub struct Gpio {
    base: PathBuf,
    lock: Mutex<()>,
}

impl Gpio {
    /// Uses the live `/sys/class/gpio` tree.
    pub fn new() -> Self {
        Self::with_base(SYSFS_GPIO_BASE)
    }

    /// Uses an alternative sysfs root; tests point this at a
    /// temporary directory.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            lock: Mutex::new(()),
        }
    }

    /// Drives `line` as an output at the given level.
    pub fn set(&self, line: u8, level: Level) -> HwResult<()> {
        let _guard = self.lock.lock().map_err(|_| HwError::LockPoisoned)?;
        let dir = self.export(line)?;
        fs::write(dir.join("direction"), b"out")?;
        fs::write(dir.join("value"), level.as_sysfs())?;
        debug!(line, %level, "gpio line driven");
        Ok(())
    }

    /// Reads `line` as an input.
    pub fn get(&self, line: u8) -> HwResult<Level> {
        let _guard = self.lock.lock().map_err(|_| HwError::LockPoisoned)?;
        let dir = self.export(line)?;
        fs::write(dir.join("direction"), b"in")?;
        let raw = fs::read(dir.join("value"))?;
        let level = raw
            .first()
            .copied()
            .and_then(Level::from_sysfs)
            .ok_or_else(|| HwError::Gpio {
                line,
                reason: "unreadable value attribute".to_string(),
            })?;
        trace!(line, %level, "gpio line read");
        Ok(level)
    }

    /// Exports the line unless its directory already exists; returns
    /// the per-line directory.
    fn export(&self, line: u8) -> HwResult<PathBuf> {
        let dir = self.base.join(format!("gpio{line}"));
        if !dir.exists() {
            fs::write(self.base.join("export"), line.to_string())?;
            if !dir.exists() {
                return Err(HwError::Gpio {
                    line,
                    reason: "kernel did not export the line".to_string(),
                });
            }
        }
        Ok(dir)
    }
}

impl Default for Gpio {
    fn default() -> Self {
        Self::new()
    }
}
