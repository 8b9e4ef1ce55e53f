//! Peripheral abstraction layer
//!
//! SPI clock modes for the panel bus and the auxiliary I2C namespace some
//! panels use for touch or backlight controllers. I2C calls report failure
//! through an explicit `Result`; platforms without I2C use [`UnsupportedI2c`].

use crate::host::HostError;

/// SPI modes (CPOL, CPHA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpiMode {
    /// Mode 0: CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Mode from its conventional 0-3 number; only the low two bits count.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index & 3 {
            0 => Self::Mode0,
            1 => Self::Mode1,
            2 => Self::Mode2,
            _ => Self::Mode3,
        }
    }

    /// Conventional 0-3 number.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Clock polarity: idle high.
    #[must_use]
    pub const fn cpol(self) -> bool {
        matches!(self, Self::Mode2 | Self::Mode3)
    }

    /// The controller's "output edge" flag, set for modes 1 and 2.
    #[must_use]
    pub const fn ck_out_edge(self) -> bool {
        matches!(self, Self::Mode1 | Self::Mode2)
    }
}

/// Synchronous I2C master used for panel side-channels.
pub trait I2cBus {
    /// Write `data` to `address`.
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), HostError>;

    /// Read into `buffer` from `address`.
    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), HostError>;

    /// Write then read with a repeated start.
    fn write_read(&mut self, address: u8, write: &[u8], read: &mut [u8])
        -> Result<(), HostError>;

    /// Read one 8-bit register.
    fn register_read8(&mut self, address: u8, reg: u8) -> Result<u8, HostError> {
        let mut buf = [0u8];
        self.write_read(address, &[reg], &mut buf)?;
        Ok(buf[0])
    }

    /// Read-modify-write one 8-bit register: `(old & mask) | data`.
    ///
    /// A `mask` of zero skips the read and writes `data` as-is.
    fn register_write8(&mut self, address: u8, reg: u8, data: u8, mask: u8) -> Result<(), HostError> {
        let value = if mask == 0 {
            data
        } else {
            (self.register_read8(address, reg)? & mask) | data
        };
        self.write(address, &[reg, value])
    }
}

/// I2C namespace for platforms without a driver: every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedI2c;

impl I2cBus for UnsupportedI2c {
    fn write(&mut self, _address: u8, _data: &[u8]) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }

    fn read(&mut self, _address: u8, _buffer: &mut [u8]) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }

    fn write_read(
        &mut self,
        _address: u8,
        _write: &[u8],
        _read: &mut [u8],
    ) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }
}
