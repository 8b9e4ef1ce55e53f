//! Bus configuration
//!
//! Everything that identifies the physical bus is an explicit value handed to
//! [`crate::PanelBus::new`] and checked once there. Panel-level settings
//! (pins for DC/CS, clocks, SPI mode) come from the [`panel_specs::Panel`].

use platform::{BusPins, SpiHost};

use crate::error::ConfigError;

/// Highest GPIO number plus one on the ESP32.
pub const GPIO_COUNT: u8 = 40;

/// Width of one command/data frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataLen {
    /// 8-bit commands and parameters (most panels).
    #[default]
    Bits8,
    /// 16-bit frames; bytes are sent in the high half.
    Bits16,
}

impl DataLen {
    /// Frame length in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
        }
    }
}

/// Busy-wait behaviour.
///
/// The default never gives up, matching a tightly coupled host where a hung
/// controller is unrecoverable anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaitPolicy {
    /// Give up with [`crate::BusError::Timeout`] after this many polls.
    pub max_polls: Option<u32>,
    /// Yield to the host scheduler every N polls; 0 never yields.
    pub yield_every: u32,
}

/// Physical bus description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// SPI controller
    pub host: SpiHost,
    /// Clock pin
    pub sclk: Option<u8>,
    /// Panel-to-host data pin
    pub miso: Option<u8>,
    /// Host-to-panel data pin
    pub mosi: Option<u8>,
    /// DMA channel, 0 disables DMA
    pub dma_channel: u8,
    /// Command/data frame width
    pub data_len: DataLen,
    /// Busy-wait behaviour
    pub wait: WaitPolicy,
}

impl BusConfig {
    /// Check channel range, pin numbers and pin uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dma_channel > 2 {
            return Err(ConfigError::DmaChannel(self.dma_channel));
        }
        let pins = [self.sclk, self.miso, self.mosi];
        for (i, pin) in pins.iter().enumerate() {
            let Some(pin) = *pin else { continue };
            if pin >= GPIO_COUNT {
                return Err(ConfigError::Pin(pin));
            }
            if pins.iter().skip(i.saturating_add(1)).any(|other| *other == Some(pin)) {
                return Err(ConfigError::PinConflict(pin));
            }
        }
        Ok(())
    }

    /// DMA is configured.
    #[must_use]
    pub const fn dma_enabled(&self) -> bool {
        self.dma_channel != 0
    }

    /// Routing request for the host.
    #[must_use]
    pub const fn pins(&self) -> BusPins {
        BusPins {
            host: self.host,
            sclk: self.sclk,
            miso: self.miso,
            mosi: self.mosi,
            dma_channel: self.dma_channel,
        }
    }
}
