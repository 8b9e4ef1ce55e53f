//! Driver error types

use platform::{DmaError, HostError};

/// Rejected [`crate::BusConfig`] field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// DMA channel outside 0..=2.
    DmaChannel(u8),
    /// GPIO number does not exist on the target.
    Pin(u8),
    /// The same GPIO is assigned to two bus signals.
    PinConflict(u8),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DmaChannel(ch) => write!(f, "DMA channel {ch} is not 0, 1 or 2"),
            Self::Pin(pin) => write!(f, "GPIO {pin} does not exist"),
            Self::PinConflict(pin) => write!(f, "GPIO {pin} is assigned to more than one signal"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Errors returned by the panel bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The controller stayed busy past the configured poll limit.
    Timeout,
    /// The host SDK rejected a bus operation.
    Host(HostError),
    /// A staging buffer could not be allocated.
    OutOfMemory {
        /// Bytes requested (after alignment)
        requested: usize,
    },
    /// Descriptor chain could not be built.
    Dma(DmaError),
    /// Caller buffer shorter than the transfer.
    BufferTooSmall {
        /// Bytes the transfer needs
        needed: usize,
        /// Bytes supplied
        got: usize,
    },
    /// Construction-time configuration check failed.
    InvalidConfig(ConfigError),
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Bus busy-wait timed out"),
            Self::Host(e) => write!(f, "Host error: {e}"),
            Self::OutOfMemory { requested } => {
                write!(f, "Failed to allocate {requested} byte staging buffer")
            }
            Self::Dma(e) => write!(f, "DMA error: {e}"),
            Self::BufferTooSmall { needed, got } => {
                write!(f, "Buffer too small: need {needed} bytes, got {got}")
            }
            Self::InvalidConfig(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Host(e) => Some(e),
            Self::Dma(e) => Some(e),
            Self::InvalidConfig(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HostError> for BusError {
    fn from(e: HostError) -> Self {
        Self::Host(e)
    }
}

impl From<DmaError> for BusError {
    fn from(e: DmaError) -> Self {
        Self::Dma(e)
    }
}

impl From<ConfigError> for BusError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}
