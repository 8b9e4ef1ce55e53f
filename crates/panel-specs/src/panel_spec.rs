//! Data-driven panel description
//!
//! [`PanelSpec`] captures everything the driver needs about a controller as
//! plain data, so boards can describe their panel in a `const` without
//! writing a [`Panel`] implementation. [`GenericPanel`] adds the mutable
//! state (depth, rotation, inversion, brightness) on top.

use platform::SpiMode;

use crate::color::ColorDepth;
use crate::command::CommandBuf;
use crate::panel::{ClockTargets, Opcodes, Panel};
use crate::window::AddressWidth;

/// Pixel-format codes written with the COLMOD opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DepthCodes {
    /// Code for 8 bpp, if supported
    pub rgb332: Option<u8>,
    /// Code for 16 bpp, if supported
    pub rgb565: Option<u8>,
    /// Code for 18 bpp, if supported
    pub rgb666: Option<u8>,
    /// Code for 24 bpp, if supported
    pub rgb888: Option<u8>,
}

impl DepthCodes {
    /// Code for `depth`.
    #[must_use]
    pub const fn code(&self, depth: ColorDepth) -> Option<u8> {
        match depth {
            ColorDepth::Rgb332 => self.rgb332,
            ColorDepth::Rgb565 => self.rgb565,
            ColorDepth::Rgb666 => self.rgb666,
            ColorDepth::Rgb888 => self.rgb888,
        }
    }

    /// `depth` if supported, else RGB565, else the first supported depth.
    #[must_use]
    pub fn resolve(&self, depth: ColorDepth) -> Option<(ColorDepth, u8)> {
        [depth, ColorDepth::Rgb565, ColorDepth::Rgb666, ColorDepth::Rgb888, ColorDepth::Rgb332]
            .into_iter()
            .find_map(|d| self.code(d).map(|c| (d, c)))
    }
}

/// Complete static description of a panel.
#[derive(Debug, Clone, Copy)]
pub struct PanelSpec {
    /// Human-readable name
    pub name: &'static str,
    /// Visible width at rotation 0
    pub width: u16,
    /// Visible height at rotation 0
    pub height: u16,
    /// Column offset at rotation 0
    pub offset_x: u16,
    /// Row offset at rotation 0
    pub offset_y: u16,
    /// Driver-issued opcodes
    pub opcodes: Opcodes,
    /// Memory-access-control opcode (rotation)
    pub madctl: u8,
    /// Memory-access-control value per rotation 0-7
    pub rotation_table: [u8; 8],
    /// Pixel-format opcode
    pub colmod: u8,
    /// Pixel-format codes
    pub depth_codes: DepthCodes,
    /// Inversion-on opcode
    pub invon: u8,
    /// Inversion off opcode
    pub invoff: u8,
    /// Panel glass is inverted: swap the meaning of the inversion opcodes
    pub reverse_invert: bool,
    /// Initialisation command lists, sent in order
    pub init_sequences: &'static [&'static [u8]],
    /// Window payload width
    pub address_width: AddressWidth,
    /// Clock targets
    pub clocks: ClockTargets,
    /// Write mode
    pub spi_mode: SpiMode,
    /// Read mode
    pub spi_mode_read: SpiMode,
    /// 3-wire bus
    pub spi_3wire: bool,
    /// Read-back supported
    pub spi_read: bool,
    /// Chip-select pin
    pub spi_cs: Option<u8>,
    /// Data/command pin
    pub spi_dc: Option<u8>,
    /// Dummy bits before pixel read data
    pub dummy_read_pixel_bits: u32,
    /// Dummy bits before identification data
    pub dummy_read_rddid_bits: u32,
    /// Fixed read-back format; `None` reads in the write format
    pub read_depth: Option<ColorDepth>,
    /// Depth applied at init
    pub default_depth: ColorDepth,
    /// Rotation applied at init
    pub default_rotation: u8,
    /// Inversion applied at init
    pub default_invert: bool,
}

/// [`Panel`] implementation over a [`PanelSpec`].
#[derive(Debug, Clone)]
pub struct GenericPanel {
    spec: PanelSpec,
    write_depth: ColorDepth,
    read_depth: ColorDepth,
    rotation: u8,
    invert: bool,
    brightness: u8,
}

impl GenericPanel {
    /// Panel in its spec's default state.
    #[must_use]
    pub fn new(spec: PanelSpec) -> Self {
        let write_depth = spec
            .depth_codes
            .resolve(spec.default_depth)
            .map_or(spec.default_depth, |(d, _)| d);
        Self {
            read_depth: spec.read_depth.unwrap_or(write_depth),
            write_depth,
            rotation: spec.default_rotation & 7,
            invert: spec.default_invert,
            brightness: u8::MAX,
            spec,
        }
    }

    /// The underlying description.
    #[must_use]
    pub fn spec(&self) -> &PanelSpec {
        &self.spec
    }

    /// Last brightness set.
    #[must_use]
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    fn swapped(&self) -> bool {
        self.rotation & 1 != 0
    }
}

impl Panel for GenericPanel {
    fn init_commands(&self, index: usize) -> Option<&[u8]> {
        self.spec.init_sequences.get(index).copied()
    }

    fn opcodes(&self) -> Opcodes {
        self.spec.opcodes
    }

    fn address_width(&self) -> AddressWidth {
        self.spec.address_width
    }

    fn col_start(&self) -> u16 {
        if self.swapped() {
            self.spec.offset_y
        } else {
            self.spec.offset_x
        }
    }

    fn row_start(&self) -> u16 {
        if self.swapped() {
            self.spec.offset_x
        } else {
            self.spec.offset_y
        }
    }

    fn width(&self) -> u16 {
        if self.swapped() {
            self.spec.height
        } else {
            self.spec.width
        }
    }

    fn height(&self) -> u16 {
        if self.swapped() {
            self.spec.width
        } else {
            self.spec.height
        }
    }

    fn clocks(&self) -> ClockTargets {
        self.spec.clocks
    }

    fn spi_mode(&self) -> SpiMode {
        self.spec.spi_mode
    }

    fn spi_mode_read(&self) -> SpiMode {
        self.spec.spi_mode_read
    }

    fn spi_3wire(&self) -> bool {
        self.spec.spi_3wire
    }

    fn spi_read(&self) -> bool {
        self.spec.spi_read
    }

    fn spi_cs(&self) -> Option<u8> {
        self.spec.spi_cs
    }

    fn spi_dc(&self) -> Option<u8> {
        self.spec.spi_dc
    }

    fn dummy_read_pixel_bits(&self) -> u32 {
        self.spec.dummy_read_pixel_bits
    }

    fn dummy_read_rddid_bits(&self) -> u32 {
        self.spec.dummy_read_rddid_bits
    }

    fn write_depth(&self) -> ColorDepth {
        self.write_depth
    }

    fn read_depth(&self) -> ColorDepth {
        self.read_depth
    }

    fn rotation(&self) -> u8 {
        self.rotation
    }

    fn invert(&self) -> bool {
        self.invert
    }

    fn color_depth_commands(&mut self, depth: ColorDepth) -> CommandBuf {
        let Some((depth, code)) = self.spec.depth_codes.resolve(depth) else {
            return CommandBuf::new();
        };
        self.write_depth = depth;
        self.read_depth = self.spec.read_depth.unwrap_or(depth);
        CommandBuf::single(self.spec.colmod, &[code]).unwrap_or_default()
    }

    fn rotation_commands(&mut self, rotation: u8) -> CommandBuf {
        self.rotation = rotation & 7;
        let value = self
            .spec
            .rotation_table
            .get(usize::from(self.rotation))
            .copied()
            .unwrap_or(0);
        CommandBuf::single(self.spec.madctl, &[value]).unwrap_or_default()
    }

    fn invert_commands(&mut self, invert: bool) -> CommandBuf {
        self.invert = invert;
        let opcode = if invert != self.spec.reverse_invert {
            self.spec.invon
        } else {
            self.spec.invoff
        };
        CommandBuf::single(opcode, &[]).unwrap_or_default()
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::command::CommandList;

    const SPEC: PanelSpec = PanelSpec {
        name: "test-240x320",
        width: 240,
        height: 320,
        offset_x: 0,
        offset_y: 80,
        opcodes: Opcodes::MIPI_DCS,
        madctl: 0x36,
        rotation_table: [0x08, 0x68, 0xC8, 0xA8, 0x48, 0x28, 0x88, 0xE8],
        colmod: 0x3A,
        depth_codes: DepthCodes {
            rgb332: None,
            rgb565: Some(0x55),
            rgb666: Some(0x66),
            rgb888: None,
        },
        invon: 0x21,
        invoff: 0x20,
        reverse_invert: false,
        init_sequences: &[&[0x01, 0x80, 5, 0xFF, 0xFF], &[0x29, 0, 0xFF, 0xFF]],
        address_width: AddressWidth::Bits32,
        clocks: ClockTargets {
            write: 40_000_000,
            read: 16_000_000,
            fill: 80_000_000,
        },
        spi_mode: SpiMode::Mode0,
        spi_mode_read: SpiMode::Mode0,
        spi_3wire: false,
        spi_read: true,
        spi_cs: Some(5),
        spi_dc: Some(2),
        dummy_read_pixel_bits: 8,
        dummy_read_rddid_bits: 1,
        read_depth: Some(ColorDepth::Rgb666),
        default_depth: ColorDepth::Rgb565,
        default_rotation: 0,
        default_invert: false,
    };

    #[test]
    fn rotation_swaps_geometry_and_offsets() {
        let mut panel = GenericPanel::new(SPEC);
        assert_eq!((panel.width(), panel.height()), (240, 320));
        assert_eq!(panel.row_start(), 80);
        let cmds = panel.rotation_commands(1);
        assert_eq!(cmds.as_bytes(), &[0x36, 1, 0x68, 0xFF, 0xFF]);
        assert_eq!((panel.width(), panel.height()), (320, 240));
        assert_eq!((panel.col_start(), panel.row_start()), (80, 0));
        panel.rotation_commands(13);
        assert_eq!(panel.rotation(), 5);
    }

    #[test]
    fn unsupported_depth_falls_back_to_rgb565() {
        let mut panel = GenericPanel::new(SPEC);
        let cmds = panel.color_depth_commands(ColorDepth::Rgb888);
        let cmd = CommandList::new(cmds.as_bytes()).next().unwrap();
        assert_eq!((cmd.opcode, cmd.args), (0x3A, &[0x55][..]));
        assert_eq!(panel.write_depth(), ColorDepth::Rgb565);
        assert_eq!(panel.read_depth(), ColorDepth::Rgb666);
    }

    #[test]
    fn supported_depth_is_applied() {
        let mut panel = GenericPanel::new(SPEC);
        panel.color_depth_commands(ColorDepth::Rgb666);
        assert_eq!(panel.write_depth(), ColorDepth::Rgb666);
    }

    #[test]
    fn invert_respects_reverse_flag() {
        let mut panel = GenericPanel::new(SPEC);
        assert_eq!(panel.invert_commands(true).as_bytes()[0], 0x21);
        assert!(panel.invert());
        let mut reversed = GenericPanel::new(PanelSpec {
            reverse_invert: true,
            ..SPEC
        });
        assert_eq!(reversed.invert_commands(true).as_bytes()[0], 0x20);
    }

    #[test]
    fn init_sequences_are_indexed() {
        let panel = GenericPanel::new(SPEC);
        assert!(panel.init_commands(0).is_some());
        assert!(panel.init_commands(1).is_some());
        assert!(panel.init_commands(2).is_none());
    }

    #[test]
    fn brightness_is_recorded() {
        let mut panel = GenericPanel::new(SPEC);
        assert_eq!(panel.brightness(), 255);
        panel.set_brightness(40);
        assert_eq!(panel.brightness(), 40);
    }
}
