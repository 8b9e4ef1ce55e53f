//! Window address packing
//!
//! Column/row address commands take a start and an end coordinate. Panels
//! with at most 256 lines per axis take one byte per coordinate; larger
//! panels take two bytes, most significant first. The packed value is laid
//! out so that its little-endian bytes are the wire order.

/// Width of one column/row address payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressWidth {
    /// One byte per coordinate.
    Bits16,
    /// Two big-endian bytes per coordinate.
    #[default]
    Bits32,
}

impl AddressWidth {
    /// Payload length in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bits16 => 16,
            Self::Bits32 => 32,
        }
    }

    /// Packing function for this width.
    #[must_use]
    pub const fn packer(self) -> fn(u16, u16) -> u32 {
        match self {
            Self::Bits16 => pack_window_addr16,
            Self::Bits32 => pack_window_addr32,
        }
    }
}

/// `[start, end]` as two single bytes.
#[must_use]
pub const fn pack_window_addr16(start: u16, end: u16) -> u32 {
    (start as u32 & 0xFF) | ((end as u32 & 0xFF) << 8)
}

/// `[start_hi, start_lo, end_hi, end_lo]`.
#[must_use]
pub const fn pack_window_addr32(start: u16, end: u16) -> u32 {
    start.swap_bytes() as u32 | ((end.swap_bytes() as u32) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr32_is_big_endian_per_coordinate() {
        let packed = pack_window_addr32(0x0102, 0x0304);
        assert_eq!(packed.to_le_bytes(), [0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn addr16_takes_low_bytes() {
        let packed = pack_window_addr16(0x12, 0x7F);
        assert_eq!(packed.to_le_bytes()[..2], [0x12, 0x7F]);
        assert_eq!(pack_window_addr16(0x1FF, 0), 0xFF);
    }

    #[test]
    fn width_selects_packer() {
        assert_eq!((AddressWidth::Bits32.packer())(1, 2), pack_window_addr32(1, 2));
        assert_eq!((AddressWidth::Bits16.packer())(1, 2), pack_window_addr16(1, 2));
        assert_eq!(AddressWidth::Bits16.bits(), 16);
    }
}
