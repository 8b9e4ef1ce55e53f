//! SPI TFT panel bus driver
//!
//! Drives an SPI-attached TFT/OLED controller through a register-level bus:
//! command sequencing interleaved with bulk pixel traffic, optionally handed
//! to a descriptor-chained DMA engine.
//!
//! # Layers
//!
//! ```text
//! PanelBus (driver.rs, blit.rs, draw_target.rs)
//!         ↓
//! transactions (transaction.rs) ─ window cache (window.rs)
//!         ↓
//! streaming (stream.rs) ─ DMA engine (dma.rs) ─ staging pool (staging.rs)
//!         ↓
//! RawBus (bus.rs) over platform::BusRegisters + platform::Host
//! ```
//!
//! # Features
//!
//! - `std`: standard library support, needed for `platform::mocks`
//! - `defmt`: log through `defmt` (embedded targets)
//! - `tracing`: log through `tracing` (host builds)
//! - `serde`: serialisable configuration enums in the lower crates

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

extern crate alloc;
#[cfg(all(feature = "std", not(test)))]
extern crate std;

#[macro_use]
mod log;

mod blit;
mod bus;
pub mod clock;
pub mod config;
mod dma;
mod draw_target;
mod driver;
pub mod error;
mod staging;
mod stream;
mod transaction;
mod window;

pub use clock::{clock_div_to_freq, freq_to_clock_div, ClockDividers};
pub use config::{BusConfig, DataLen, WaitPolicy};
pub use dma::DmaEngine;
pub use driver::PanelBus;
pub use error::{BusError, ConfigError};
pub use staging::StagingPool;
pub use transaction::Transaction;
