//! # pihub-hw: board peripherals for the PiHub daemon
//!
//! The hardware collaborators consumed by command handlers:
//!
//! - [`RegisterBus`] - byte-register transport keyed by device and
//!   register address, with the Linux [`I2cBus`] implementation and a
//!   [`MockBus`] double for tests and hardware-less development.
//! - [`Gpio`] - digital line control through the sysfs interface.
//! - [`Bme280`] - environmental sensor driver (temperature, humidity,
//!   pressure) on top of any [`RegisterBus`].

mod bme280;
mod bus;
mod error;
mod gpio;

pub use bme280::Bme280;
pub use bus::{I2cBus, MockBus, RegisterBus};
pub use error::{HwError, HwResult};
pub use gpio::{Gpio, Level};
