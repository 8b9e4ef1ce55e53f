//! Hardware Abstraction Layer (HAL) for the panel bus
//!
//! This crate provides the hardware seams the panel driver is written
//! against, so that everything above it can be developed and tested without
//! a board attached.
//!
//! # Architecture Layers
//!
//! ```text
//! Application
//!         ↓
//! panelbus (transactions, windowing, pixel streaming, DMA)
//!         ↓
//! panel-specs (panel description + pixel conversion)
//!         ↓
//! Platform HAL (this crate - registers, host, descriptors)
//!         ↓
//! Silicon (ESP32 SPI2/SPI3 + GDMA) or mocks::SimBus
//! ```
//!
//! # Modules
//!
//! - [`registers`] - Named SPI controller registers and bit constants
//! - [`host`] - GPIO, pin routing, bus arbitration, APB clock, DMA resets
//! - [`gpio`] - Pin levels and modes
//! - [`peripheral`] - SPI modes and the auxiliary I2C namespace
//! - [`dma`] - Link-list descriptor chains
//! - [`dma_safety`] - Alignment and sizing constants
//!
//! # Features
//!
//! - `std`: Enable standard library support and the [`mocks`] module
//! - `defmt`: Enable defmt logging derives
//! - `serde`: Serialize configuration enums
//!
//! # Example
//!
//! ```no_run
//! use platform::registers::{BusRegisters, Esp32Spi, SpiHost};
//!
//! // SAFETY: running on an ESP32 with VSPI reserved for the panel.
//! let mut regs = unsafe { Esp32Spi::new(SpiHost::Vspi) };
//! while regs.is_busy() {}
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors — callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;
#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod dma;
pub mod dma_safety;
pub mod gpio;
pub mod host;
pub mod mocks;
pub mod peripheral;
pub mod registers;

// Re-export the collaborator traits
pub use host::{BusPins, Host, HostError};
pub use peripheral::{I2cBus, SpiMode, UnsupportedI2c};
pub use registers::{BusRegisters, Esp32Spi, Reg, SpiHost};

// Re-export GPIO types
pub use gpio::{PinMode, PinState};

// Re-export DMA types
pub use dma::{DescriptorChain, DmaDescriptor, DmaError};
