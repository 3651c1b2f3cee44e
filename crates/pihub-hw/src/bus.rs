//! Register-oriented transport shared by the sensor drivers.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::error::{HwError, HwResult};

/// Byte-register transport keyed by device address and register
/// address.
///
/// Implementations serialise access internally, so a single bus can
/// be shared between several sensor drivers.
pub trait RegisterBus: Send + Sync {
    /// Burst-reads `buf.len()` bytes starting at `register`.
    fn read_registers(&self, device: u8, register: u8, buf: &mut [u8]) -> HwResult<()>;

    /// Writes one byte to `register`.
    fn write_register(&self, device: u8, register: u8, value: u8) -> HwResult<()>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for Arc<B> {
    fn read_registers(&self, device: u8, register: u8, buf: &mut [u8]) -> HwResult<()> {
        (**self).read_registers(device, register, buf)
    }

    fn write_register(&self, device: u8, register: u8, value: u8) -> HwResult<()> {
        (**self).write_register(device, register, value)
    }
}

// I2C_SLAVE ioctl from linux/i2c-dev.h.
nix::ioctl_write_int_bad!(i2c_set_slave_addr, 0x0703);

/// Linux I²C adapter exposed through `/dev/i2c-N`.
///
/// The slave address is selected with the `I2C_SLAVE` ioctl before
/// each transfer; a register read is a write of the register address
/// followed by a read of the payload. One internal lock serialises
/// the select-transfer sequence.
pub struct I2cBus {
    adapter: u32,
    file: Mutex<File>,
}

impl I2cBus {
    /// Opens `/dev/i2c-{adapter}` for read/write access.
    pub fn open(adapter: u32) -> HwResult<Self> {
        let path = format!("/dev/i2c-{adapter}");
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        debug!(path, "i2c adapter opened");
        Ok(Self {
            adapter,
            file: Mutex::new(file),
        })
    }

    /// The adapter index this bus was opened on.
    pub fn adapter(&self) -> u32 {
        self.adapter
    }

    fn select(file: &File, device: u8) -> HwResult<()> {
        unsafe { i2c_set_slave_addr(file.as_raw_fd(), i32::from(device)) }
            .map_err(|errno| HwError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;
        Ok(())
    }
}

impl RegisterBus for I2cBus {
    fn read_registers(&self, device: u8, register: u8, buf: &mut [u8]) -> HwResult<()> {
        let mut file = self.file.lock().map_err(|_| HwError::LockPoisoned)?;
        Self::select(&file, device)?;
        file.write_all(&[register])?;
        file.read_exact(buf)?;
        trace!(
            "read {} bytes (dev: {device:#04X}, reg: {register:#04X})",
            buf.len()
        );
        Ok(())
    }

    fn write_register(&self, device: u8, register: u8, value: u8) -> HwResult<()> {
        let mut file = self.file.lock().map_err(|_| HwError::LockPoisoned)?;
        Self::select(&file, device)?;
        file.write_all(&[register, value])?;
        trace!("wrote {value:#04X} (dev: {device:#04X}, reg: {register:#04X})");
        Ok(())
    }
}

impl std::fmt::Debug for I2cBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cBus").field("adapter", &self.adapter).finish()
    }
}

/// In-memory register map, for tests and hardware-less development.
#[derive(Debug, Default)]
pub struct MockBus {
    regs: Mutex<HashMap<(u8, u8), u8>>,
}

impl MockBus {
    /// Stores `bytes` at consecutive registers starting at `register`.
    pub fn preload(&self, device: u8, register: u8, bytes: &[u8]) {
        let mut regs = self.regs.lock().expect("mock bus lock");
        for (offset, byte) in bytes.iter().enumerate() {
            regs.insert((device, register.wrapping_add(offset as u8)), *byte);
        }
    }

    /// Reads back one register, if anything was written there.
    pub fn register(&self, device: u8, register: u8) -> Option<u8> {
        self.regs.lock().expect("mock bus lock").get(&(device, register)).copied()
    }
}

impl RegisterBus for MockBus {
    fn read_registers(&self, device: u8, register: u8, buf: &mut [u8]) -> HwResult<()> {
        let regs = self.regs.lock().map_err(|_| HwError::LockPoisoned)?;
        for (offset, slot) in buf.iter_mut().enumerate() {
            *slot = regs
                .get(&(device, register.wrapping_add(offset as u8)))
                .copied()
                .unwrap_or(0);
        }
        Ok(())
    }

    fn write_register(&self, device: u8, register: u8, value: u8) -> HwResult<()> {
        let mut regs = self.regs.lock().map_err(|_| HwError::LockPoisoned)?;
        regs.insert((device, register), value);
        Ok(())
    }
}
