//! Host environment collaborator
//!
//! Everything the panel bus needs from the surrounding SDK that is not a bus
//! register: GPIO, pin routing, bus arbitration, the APB clock, DMA module
//! resets and a cooperative yield point. Delays come from
//! [`embedded_hal::delay::DelayNs`] and are passed to the driver separately.

use crate::gpio::{PinMode, PinState};
use crate::registers::SpiHost;

/// Pin routing for one SPI controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusPins {
    /// Controller to route.
    pub host: SpiHost,
    /// Clock pin, `None` when not routed.
    pub sclk: Option<u8>,
    /// Master-in pin.
    pub miso: Option<u8>,
    /// Master-out pin.
    pub mosi: Option<u8>,
    /// DMA channel to attach (0 = none).
    pub dma_channel: u8,
}

/// Host-side failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError {
    /// The SDK rejected the bus parameters.
    BusInit,
    /// Exclusive bus access could not be obtained.
    Acquire,
    /// The platform does not implement this namespace.
    Unsupported,
    /// A transfer on an auxiliary bus failed.
    Transfer,
}

#[cfg(feature = "std")]
impl std::error::Error for HostError {}

impl core::fmt::Display for HostError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BusInit => write!(f, "Bus initialization rejected by host"),
            Self::Acquire => write!(f, "Failed to acquire bus"),
            Self::Unsupported => write!(f, "Operation not supported on this platform"),
            Self::Transfer => write!(f, "Auxiliary bus transfer failed"),
        }
    }
}

/// Services the panel bus borrows from the host SDK.
pub trait Host {
    /// Configure a GPIO.
    fn pin_mode(&mut self, pin: u8, mode: PinMode);

    /// Drive an output GPIO.
    fn set_pin(&mut self, pin: u8, state: PinState);

    /// Route bus pins, enable the controller clock and attach the DMA channel.
    fn init_bus(&mut self, pins: &BusPins) -> Result<(), HostError>;

    /// Detach the controller from its pins and disable it.
    fn deinit_bus(&mut self, host: SpiHost);

    /// Take exclusive ownership of the controller, blocking until available.
    fn acquire_bus(&mut self, host: SpiHost) -> Result<(), HostError>;

    /// Hand the controller back to other bus users.
    fn release_bus(&mut self, host: SpiHost);

    /// Current APB clock in Hz (the SPI divider input).
    fn apb_frequency(&self) -> u32;

    /// Let other cooperative tasks run.
    fn yield_now(&mut self);

    /// Pulse the DMA module reset line.
    fn reset_dma(&mut self);

    /// Tell the SDK a DMA transfer is about to run on `channel`.
    fn dma_transfer_active(&mut self, channel: u8);
}

impl<T: Host + ?Sized> Host for &mut T {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) {
        (**self).pin_mode(pin, mode);
    }

    fn set_pin(&mut self, pin: u8, state: PinState) {
        (**self).set_pin(pin, state);
    }

    fn init_bus(&mut self, pins: &BusPins) -> Result<(), HostError> {
        (**self).init_bus(pins)
    }

    fn deinit_bus(&mut self, host: SpiHost) {
        (**self).deinit_bus(host);
    }

    fn acquire_bus(&mut self, host: SpiHost) -> Result<(), HostError> {
        (**self).acquire_bus(host)
    }

    fn release_bus(&mut self, host: SpiHost) {
        (**self).release_bus(host);
    }

    fn apb_frequency(&self) -> u32 {
        (**self).apb_frequency()
    }

    fn yield_now(&mut self) {
        (**self).yield_now();
    }

    fn reset_dma(&mut self) {
        (**self).reset_dma();
    }

    fn dma_transfer_active(&mut self, channel: u8) {
        (**self).dma_transfer_active(channel);
    }
}
