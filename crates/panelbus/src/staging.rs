//! Double-buffered staging memory
//!
//! Source data that is not already DMA-eligible (converted pixels, rows cut
//! out of an image, read-back strips) is copied into one of two driver-owned
//! buffers. Every acquisition flips to the other buffer, so one can be
//! shifted out by DMA while the next is being filled. Contents do not
//! survive two consecutive acquisitions.

use alloc::vec::Vec;

use platform::dma_safety::{align_up, DMA_ALIGN};

use crate::error::BusError;

/// Two grow-only, word-aligned scratch buffers.
#[derive(Debug, Default)]
pub struct StagingPool {
    bufs: [Vec<u32>; 2],
    flip: usize,
}

impl StagingPool {
    /// Empty pool; nothing is allocated until first use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bufs: [Vec::new(), Vec::new()],
            flip: 0,
        }
    }

    /// Flip to the other buffer and return its first `len` bytes.
    ///
    /// The buffer is grown (old allocation freed first) when smaller than
    /// `len` rounded up to [`DMA_ALIGN`]. On allocation failure the slot is
    /// left empty and [`BusError::OutOfMemory`] is returned.
    pub fn acquire(&mut self, len: usize) -> Result<&mut [u8], BusError> {
        self.flip ^= 1;
        let aligned = align_up(len);
        let words = aligned / DMA_ALIGN;
        let Some(slot) = self.bufs.get_mut(self.flip) else {
            return Err(BusError::OutOfMemory { requested: aligned });
        };
        if slot.len() < words {
            *slot = Vec::new();
            let mut grown = Vec::new();
            if grown.try_reserve_exact(words).is_err() {
                warn!("staging buffer allocation of {} bytes failed", aligned);
                return Err(BusError::OutOfMemory { requested: aligned });
            }
            grown.resize(words, 0);
            *slot = grown;
        }
        let bytes = slot.len().saturating_mul(DMA_ALIGN);
        // SAFETY: a Vec<u32> allocation of `slot.len()` words is valid for
        // reads and writes of `bytes` bytes, u8 has no alignment requirement,
        // and the slice borrows `self` mutably so no other view exists.
        let all = unsafe { core::slice::from_raw_parts_mut(slot.as_mut_ptr().cast::<u8>(), bytes) };
        Ok(all.get_mut(..len).unwrap_or_default())
    }

    /// Bytes allocated for buffer `index` (0 or 1).
    #[must_use]
    pub fn capacity(&self, index: usize) -> usize {
        self.bufs
            .get(index)
            .map_or(0, |b| b.len().saturating_mul(DMA_ALIGN))
    }

    /// Buffer handed out by the latest [`Self::acquire`].
    #[must_use]
    pub fn active(&self) -> usize {
        self.flip
    }

    /// Start address of buffer `index`.
    #[must_use]
    pub fn as_ptr(&self, index: usize) -> *const u8 {
        self.bufs
            .get(index)
            .map_or(core::ptr::null(), |b| b.as_ptr().cast::<u8>())
    }

    /// Free both buffers.
    pub fn release(&mut self) {
        self.bufs = [Vec::new(), Vec::new()];
    }
}
