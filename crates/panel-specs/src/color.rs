//! Colour depths and wire encoding
//!
//! A "raw" colour is the wire representation packed into a `u32` so that its
//! little-endian bytes are the bytes shifted out, first byte first. The SPI
//! data buffer is little-endian too, so a raw colour can be written to a
//! data register unchanged.

/// Pixel formats a panel can be driven in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorDepth {
    /// 8 bpp, RRRGGGBB
    Rgb332,
    /// 16 bpp, RRRRRGGG GGGBBBBB (big-endian on the wire)
    #[default]
    Rgb565,
    /// 18 bpp in three bytes, low two bits of each unused
    Rgb666,
    /// 24 bpp in three bytes
    Rgb888,
}

impl ColorDepth {
    /// Significant bits per pixel.
    #[must_use]
    pub const fn depth_bits(self) -> u8 {
        match self {
            Self::Rgb332 => 8,
            Self::Rgb565 => 16,
            Self::Rgb666 => 18,
            Self::Rgb888 => 24,
        }
    }

    /// Bytes per pixel on the wire.
    #[must_use]
    pub const fn bytes(self) -> u8 {
        match self {
            Self::Rgb332 => 1,
            Self::Rgb565 => 2,
            Self::Rgb666 | Self::Rgb888 => 3,
        }
    }

    /// Bits per pixel on the wire.
    #[must_use]
    pub const fn wire_bits(self) -> u8 {
        self.bytes() * 8
    }
}

/// Converter between `0xRRGGBB` and one wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ColorConverter {
    /// Target format.
    pub depth: ColorDepth,
    /// Wire bits per pixel.
    pub bits: u8,
    /// Wire bytes per pixel.
    pub bytes: u8,
}

impl From<ColorDepth> for ColorConverter {
    fn from(depth: ColorDepth) -> Self {
        Self::new(depth)
    }
}

#[allow(clippy::cast_possible_truncation)] // Safety: channel extraction masks to 8 bits
const fn channels(rgb888: u32) -> (u8, u8, u8) {
    ((rgb888 >> 16) as u8, (rgb888 >> 8) as u8, rgb888 as u8)
}

const fn pack888(r: u8, g: u8, b: u8) -> u32 {
    (r as u32) << 16 | (g as u32) << 8 | b as u32
}

impl ColorConverter {
    /// Converter for `depth`.
    #[must_use]
    pub const fn new(depth: ColorDepth) -> Self {
        Self {
            depth,
            bits: depth.wire_bits(),
            bytes: depth.bytes(),
        }
    }

    /// `0xRRGGBB` to raw wire value.
    #[must_use]
    pub const fn encode(&self, rgb888: u32) -> u32 {
        let (r, g, b) = channels(rgb888);
        match self.depth {
            ColorDepth::Rgb332 => ((r & 0xE0) | ((g >> 3) & 0x1C) | (b >> 6)) as u32,
            ColorDepth::Rgb565 => {
                let v = ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3);
                v.swap_bytes() as u32
            }
            ColorDepth::Rgb666 => {
                (r & 0xFC) as u32 | ((g & 0xFC) as u32) << 8 | ((b & 0xFC) as u32) << 16
            }
            ColorDepth::Rgb888 => r as u32 | (g as u32) << 8 | (b as u32) << 16,
        }
    }

    /// Raw wire value to `0xRRGGBB`, replicating high bits into the gaps.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Safety: every cast follows a mask or shift into 8 bits
    pub const fn decode(&self, raw: u32) -> u32 {
        match self.depth {
            ColorDepth::Rgb332 => {
                let v = raw as u8;
                let r = v & 0xE0;
                let g = (v << 3) & 0xE0;
                let b = (v << 6) & 0xC0;
                pack888(
                    r | r >> 3 | r >> 6,
                    g | g >> 3 | g >> 6,
                    b | b >> 2 | b >> 4 | b >> 6,
                )
            }
            ColorDepth::Rgb565 => {
                let v = (raw as u16).swap_bytes();
                let r = (v >> 11) as u8;
                let g = ((v >> 5) & 0x3F) as u8;
                let b = (v & 0x1F) as u8;
                pack888(r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2)
            }
            ColorDepth::Rgb666 => {
                let (r, g, b) = (raw as u8, (raw >> 8) as u8, (raw >> 16) as u8);
                pack888(r | r >> 6, g | g >> 6, b | b >> 6)
            }
            ColorDepth::Rgb888 => pack888(raw as u8, (raw >> 8) as u8, (raw >> 16) as u8),
        }
    }

    /// Write a raw value's wire bytes to the front of `dst`.
    ///
    /// Writes nothing if `dst` is shorter than one pixel.
    pub fn write_raw(&self, raw: u32, dst: &mut [u8]) {
        let bytes = raw.to_le_bytes();
        if let (Some(dst), Some(src)) = (
            dst.get_mut(..usize::from(self.bytes)),
            bytes.get(..usize::from(self.bytes)),
        ) {
            dst.copy_from_slice(src);
        }
    }

    /// Read one pixel's wire bytes from the front of `src` as a raw value.
    #[must_use]
    pub fn read_raw(&self, src: &[u8]) -> u32 {
        let mut bytes = [0u8; 4];
        if let (Some(dst), Some(src)) = (
            bytes.get_mut(..usize::from(self.bytes)),
            src.get(..usize::from(self.bytes)),
        ) {
            dst.copy_from_slice(src);
        }
        u32::from_le_bytes(bytes)
    }

    /// Re-encode a raw value of format `from` into this format.
    #[must_use]
    pub const fn convert_from(&self, from: &Self, raw: u32) -> u32 {
        if from.depth as u8 == self.depth as u8 {
            raw
        } else {
            self.encode(from.decode(raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb565_is_big_endian_on_wire() {
        let conv = ColorConverter::new(ColorDepth::Rgb565);
        let raw = conv.encode(0xFF0000);
        assert_eq!(raw.to_le_bytes()[..2], [0xF8, 0x00]);
        assert_eq!(conv.decode(raw), 0xFF0000);
    }

    #[test]
    fn rgb888_bytes_are_r_g_b() {
        let conv = ColorConverter::new(ColorDepth::Rgb888);
        assert_eq!(conv.encode(0x123456).to_le_bytes()[..3], [0x12, 0x34, 0x56]);
        assert_eq!(conv.decode(conv.encode(0x123456)), 0x123456);
    }

    #[test]
    fn rgb666_drops_low_bits() {
        let conv = ColorConverter::new(ColorDepth::Rgb666);
        assert_eq!(conv.encode(0x030303), 0);
        assert_eq!(conv.decode(conv.encode(0xFFFFFF)), 0xFFFFFF);
    }

    #[test]
    fn rgb332_extremes() {
        let conv = ColorConverter::new(ColorDepth::Rgb332);
        assert_eq!(conv.encode(0xFFFFFF), 0xFF);
        assert_eq!(conv.decode(0xFF), 0xFFFFFF);
        assert_eq!(conv.decode(0), 0);
    }

    #[test]
    fn converter_reports_wire_size() {
        let conv = ColorConverter::from(ColorDepth::Rgb666);
        assert_eq!((conv.bits, conv.bytes), (24, 3));
        assert_eq!(ColorDepth::Rgb666.depth_bits(), 18);
        assert_eq!(ColorConverter::new(ColorDepth::Rgb332).bits, 8);
    }

    #[test]
    fn raw_bytes_round_trip_through_slices() {
        let conv = ColorConverter::new(ColorDepth::Rgb888);
        let mut buf = [0u8; 4];
        conv.write_raw(0x00AA_BBCC, &mut buf);
        assert_eq!(buf, [0xCC, 0xBB, 0xAA, 0]);
        assert_eq!(conv.read_raw(&buf), 0x00AA_BBCC);
        conv.write_raw(0x1, &mut buf[..2]);
        assert_eq!(buf, [0xCC, 0xBB, 0xAA, 0]);
    }

    #[test]
    fn convert_between_depths() {
        let from = ColorConverter::new(ColorDepth::Rgb888);
        let to = ColorConverter::new(ColorDepth::Rgb565);
        let raw = from.encode(0x00FF00);
        assert_eq!(to.convert_from(&from, raw), to.encode(0x00FF00));
        assert_eq!(from.convert_from(&from, raw), raw);
    }
}
