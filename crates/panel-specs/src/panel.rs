//! Panel collaborator interface
//!
//! A [`Panel`] describes one display controller to the bus driver: opcodes,
//! geometry, clock targets, control pins and the command lists that switch
//! colour depth, rotation and inversion. The driver has no built-in
//! knowledge of any particular controller.

use platform::SpiMode;

use crate::color::ColorDepth;
use crate::command::CommandBuf;
use crate::window::AddressWidth;

/// Opcodes the driver issues on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Opcodes {
    /// Memory write
    pub ramwr: u8,
    /// Memory read
    pub ramrd: u8,
    /// Column address set
    pub caset: u8,
    /// Row (page) address set
    pub raset: u8,
    /// Sleep in
    pub slpin: u8,
    /// Sleep out
    pub slpout: u8,
    /// Read display identification
    pub rddid: u8,
}

impl Opcodes {
    /// The MIPI DCS defaults shared by most SPI TFT controllers.
    pub const MIPI_DCS: Self = Self {
        ramwr: 0x2C,
        ramrd: 0x2E,
        caset: 0x2A,
        raset: 0x2B,
        slpin: 0x10,
        slpout: 0x11,
        rddid: 0x04,
    };
}

impl Default for Opcodes {
    fn default() -> Self {
        Self::MIPI_DCS
    }
}

/// SPI clock targets in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockTargets {
    /// Commands and pixel writes
    pub write: u32,
    /// Read-back
    pub read: u32,
    /// Solid fills
    pub fill: u32,
}

impl Default for ClockTargets {
    fn default() -> Self {
        Self {
            write: 40_000_000,
            read: 16_000_000,
            fill: 40_000_000,
        }
    }
}

/// Description of an attached display controller.
pub trait Panel {
    /// Board-level bring-up (reset line, backlight) before any command.
    fn init(&mut self) {}

    /// Initialisation command list number `index`; `None` past the last one.
    fn init_commands(&self, index: usize) -> Option<&[u8]>;

    /// Opcodes used by the driver.
    fn opcodes(&self) -> Opcodes;

    /// Column/row address payload width.
    fn address_width(&self) -> AddressWidth;

    /// Column offset of the visible area in controller RAM.
    fn col_start(&self) -> u16;

    /// Row offset of the visible area in controller RAM.
    fn row_start(&self) -> u16;

    /// Visible width at the current rotation.
    fn width(&self) -> u16;

    /// Visible height at the current rotation.
    fn height(&self) -> u16;

    /// Bus clock targets.
    fn clocks(&self) -> ClockTargets;

    /// SPI mode for writes.
    fn spi_mode(&self) -> SpiMode;

    /// SPI mode for reads.
    fn spi_mode_read(&self) -> SpiMode;

    /// MOSI is bidirectional (no MISO line).
    fn spi_3wire(&self) -> bool;

    /// The panel can be read back.
    fn spi_read(&self) -> bool;

    /// Chip-select GPIO, `None` when tied low.
    fn spi_cs(&self) -> Option<u8>;

    /// Data/command GPIO.
    fn spi_dc(&self) -> Option<u8>;

    /// Dummy clock cycles before pixel read data.
    fn dummy_read_pixel_bits(&self) -> u32;

    /// Dummy clock cycles before identification data.
    fn dummy_read_rddid_bits(&self) -> u32;

    /// Current write format.
    fn write_depth(&self) -> ColorDepth;

    /// Format pixels are read back in.
    fn read_depth(&self) -> ColorDepth;

    /// Current rotation (0-7; 4-7 mirrored).
    fn rotation(&self) -> u8;

    /// Inversion currently requested.
    fn invert(&self) -> bool;

    /// Switch colour depth; updates the write/read depth and returns the commands to send.
    fn color_depth_commands(&mut self, depth: ColorDepth) -> CommandBuf;

    /// Switch rotation; updates geometry and returns the commands to send.
    fn rotation_commands(&mut self, rotation: u8) -> CommandBuf;

    /// Switch inversion and return the commands to send.
    fn invert_commands(&mut self, invert: bool) -> CommandBuf;

    /// Backlight level; panels without backlight control ignore it.
    fn set_brightness(&mut self, _brightness: u8) {}
}
