//! DMA alignment and sizing constants for the ESP32 SPI DMA engine.
//!
//! ## DMA accessibility on ESP32
//!
//! | Memory Region   | Base Address | DMA | Use case |
//! |-----------------|-------------|-----|----------|
//! | Internal DRAM   | 0x3FFA_E000 | YES | descriptors, staging buffers |
//! | External PSRAM  | 0x3F80_0000 | NO  | caller images (must be staged) |
//! | Flash (rodata)  | 0x3F40_0000 | NO  | const images (must be staged) |
//!
//! Descriptors hold a 20-bit address offset into internal DRAM, so both the
//! descriptor array and every buffer it points at must live there. The
//! global allocator on the target is expected to hand out DMA-capable memory.

/// Byte granularity of DMA buffer sizes and addresses.
pub const DMA_ALIGN: usize = 4;

/// Largest payload one descriptor can carry (12-bit length field, word aligned).
pub const MAX_DMA_LEN: usize = 4096 - DMA_ALIGN;

/// Size of the shift-register data buffer (W0..W15) in bytes.
pub const TRANSFER_BUFFER_BYTES: usize = 64;

/// Size of one half of the data buffer in bytes.
pub const HALF_BUFFER_BYTES: usize = TRANSFER_BUFFER_BYTES / 2;

/// Transfers up to this many bytes are loaded straight into the data buffer.
pub const DIRECT_WRITE_LIMIT: usize = TRANSFER_BUFFER_BYTES;

/// Images up to this many bytes are staged in a single buffer.
pub const SINGLE_SHOT_STAGING_LIMIT: usize = 1024;

/// Round `len` up to [`DMA_ALIGN`].
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // Safety: saturating add; mask cannot overflow
pub const fn align_up(len: usize) -> usize {
    len.saturating_add(DMA_ALIGN - 1) & !(DMA_ALIGN - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_words() {
        assert_eq!(align_up(0), 0);
        assert_eq!(align_up(1), 4);
        assert_eq!(align_up(4), 4);
        assert_eq!(align_up(4093), 4096);
    }

    #[test]
    fn max_len_fits_twelve_bit_field() {
        assert!(MAX_DMA_LEN < 1 << 12);
        assert_eq!(MAX_DMA_LEN % DMA_ALIGN, 0);
    }
}
