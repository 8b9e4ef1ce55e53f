//! DMA link-list descriptors
//!
//! The SPI DMA engine walks a singly linked list of descriptors, each naming a
//! buffer, its size and how many bytes of it are valid. [`DescriptorChain`]
//! owns one growable descriptor array and rebuilds it in place for every
//! transfer in one of three shapes: linear, strided rows, or scatter (with an
//! optional ring for continuous output).

use alloc::vec::Vec;
use core::ptr;

use crate::dma_safety::{align_up, MAX_DMA_LEN};

const FIELD_MASK: u32 = 0x0FFF;
const LENGTH_SHIFT: u32 = 12;
const EOF_BIT: u32 = 1 << 30;
const OWNER_DMA: u32 = 1 << 31;

/// Descriptor-chain failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// The descriptor array could not be grown.
    OutOfMemory,
    /// A single row exceeds what one descriptor can carry.
    RowTooLong {
        /// Requested row length in bytes
        len: usize,
    },
    /// Nothing to transfer.
    Empty,
}

#[cfg(feature = "std")]
impl std::error::Error for DmaError {}

impl core::fmt::Display for DmaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "DMA descriptor allocation failed"),
            Self::RowTooLong { len } => {
                write!(f, "DMA row of {len} bytes exceeds {MAX_DMA_LEN}")
            }
            Self::Empty => write!(f, "Empty DMA transfer"),
        }
    }
}

/// One hardware link-list descriptor (`lldesc_t` layout).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaDescriptor {
    word0: u32,
    buf: *const u8,
    next: *const DmaDescriptor,
}

impl DmaDescriptor {
    const EMPTY: Self = Self {
        word0: 0,
        buf: ptr::null(),
        next: ptr::null(),
    };

    #[allow(clippy::cast_possible_truncation)] // Safety: callers bound size/length by MAX_DMA_LEN
    fn new(buf: *const u8, size: usize, length: usize, eof: bool, next: *const Self) -> Self {
        let mut word0 = OWNER_DMA
            | (size as u32 & FIELD_MASK)
            | ((length as u32 & FIELD_MASK) << LENGTH_SHIFT);
        if eof {
            word0 |= EOF_BIT;
        }
        Self { word0, buf, next }
    }

    /// Buffer size in bytes (word aligned for the linear and strided shapes).
    #[must_use]
    pub fn size(&self) -> usize {
        (self.word0 & FIELD_MASK) as usize
    }

    /// Valid bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        ((self.word0 >> LENGTH_SHIFT) & FIELD_MASK) as usize
    }

    /// `true` when the descriptor carries no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// End-of-frame marker.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.word0 & EOF_BIT != 0
    }

    /// Owned by the DMA engine rather than the CPU.
    #[must_use]
    pub fn is_dma_owned(&self) -> bool {
        self.word0 & OWNER_DMA != 0
    }

    /// Source buffer.
    #[must_use]
    pub fn buffer(&self) -> *const u8 {
        self.buf
    }

    /// Next descriptor, null at the end of a terminated chain.
    #[must_use]
    pub fn next(&self) -> *const DmaDescriptor {
        self.next
    }
}

/// Grow-only descriptor array reused across transfers.
#[derive(Debug, Default)]
pub struct DescriptorChain {
    descs: Vec<DmaDescriptor>,
    active: usize,
}

// SAFETY: the raw pointers are never dereferenced by this type; they are only
// handed to the DMA engine. Moving the chain between threads moves the array
// together with the addresses it links.
unsafe impl Send for DescriptorChain {}

impl DescriptorChain {
    /// Empty chain; nothing is allocated until the first build.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            descs: Vec::new(),
            active: 0,
        }
    }

    /// Allocated descriptor slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.descs.len()
    }

    /// Descriptors of the most recent build.
    #[must_use]
    pub fn descriptors(&self) -> &[DmaDescriptor] {
        self.descs.get(..self.active).unwrap_or_default()
    }

    /// Address of the first descriptor, for the link register.
    #[must_use]
    pub fn head(&self) -> *const DmaDescriptor {
        self.descs.as_ptr()
    }

    fn reserve(&mut self, count: usize) -> Result<(), DmaError> {
        self.active = 0;
        if count <= self.descs.len() {
            return Ok(());
        }
        // Free first so the peak footprint stays at one array.
        self.descs = Vec::new();
        let mut descs = Vec::new();
        descs
            .try_reserve_exact(count)
            .map_err(|_| DmaError::OutOfMemory)?;
        descs.resize(count, DmaDescriptor::EMPTY);
        self.descs = descs;
        Ok(())
    }

    /// Link `data[..len]` as consecutive segments of at most [`MAX_DMA_LEN`].
    ///
    /// Returns the number of descriptors built.
    #[allow(clippy::arithmetic_side_effects)] // Safety: i < count = ceil(len / MAX), so offset < len
    pub fn build_linear(&mut self, data: *const u8, len: usize) -> Result<usize, DmaError> {
        if len == 0 {
            return Err(DmaError::Empty);
        }
        let count = len.div_ceil(MAX_DMA_LEN);
        self.reserve(count)?;
        let base = self.descs.as_ptr();
        for (i, desc) in self.descs.iter_mut().take(count).enumerate() {
            let offset = i * MAX_DMA_LEN;
            let seg = (len - offset).min(MAX_DMA_LEN);
            let last = i + 1 == count;
            let next = if last { ptr::null() } else { base.wrapping_add(i + 1) };
            *desc = DmaDescriptor::new(data.wrapping_add(offset), align_up(seg), seg, last, next);
        }
        self.active = count;
        Ok(count)
    }

    /// Link `rows` rows of `row_len` bytes whose starts are `stride` bytes apart.
    #[allow(clippy::arithmetic_side_effects)] // Safety: i < rows; pointer math is wrapping
    pub fn build_strided(
        &mut self,
        data: *const u8,
        row_len: usize,
        rows: usize,
        stride: usize,
    ) -> Result<usize, DmaError> {
        if rows == 0 || row_len == 0 {
            return Err(DmaError::Empty);
        }
        if row_len > MAX_DMA_LEN {
            return Err(DmaError::RowTooLong { len: row_len });
        }
        self.reserve(rows)?;
        let base = self.descs.as_ptr();
        let size = align_up(row_len);
        let mut src = data;
        for (i, desc) in self.descs.iter_mut().take(rows).enumerate() {
            let last = i + 1 == rows;
            let next = if last { ptr::null() } else { base.wrapping_add(i + 1) };
            *desc = DmaDescriptor::new(src, size, row_len, last, next);
            src = src.wrapping_add(stride);
        }
        self.active = rows;
        Ok(rows)
    }

    /// Link one descriptor per row pointer.
    ///
    /// With `ring` the last descriptor points back at the first and no
    /// end-of-frame is flagged, so the engine loops until stopped.
    #[allow(clippy::arithmetic_side_effects)] // Safety: i < rows.len()
    pub fn build_scatter(
        &mut self,
        rows: &[*const u8],
        row_len: usize,
        ring: bool,
    ) -> Result<usize, DmaError> {
        let count = rows.len();
        if count == 0 || row_len == 0 {
            return Err(DmaError::Empty);
        }
        if row_len > MAX_DMA_LEN {
            return Err(DmaError::RowTooLong { len: row_len });
        }
        self.reserve(count)?;
        let base = self.descs.as_ptr();
        for (i, (desc, &row)) in self.descs.iter_mut().zip(rows).enumerate() {
            let last = i + 1 == count;
            let (eof, next) = match (last, ring) {
                (false, _) => (false, base.wrapping_add(i + 1)),
                (true, true) => (false, base),
                (true, false) => (true, ptr::null()),
            };
            *desc = DmaDescriptor::new(row, row_len, row_len, eof, next);
        }
        self.active = count;
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn linear_splits_into_max_segments() {
        let data = vec![0u8; MAX_DMA_LEN * 2 + 10];
        let mut chain = DescriptorChain::new();
        let n = chain.build_linear(data.as_ptr(), data.len()).unwrap();
        assert_eq!(n, 3);
        let d = chain.descriptors();
        assert_eq!(d[0].len(), MAX_DMA_LEN);
        assert_eq!(d[1].len(), MAX_DMA_LEN);
        assert_eq!(d[2].len(), 10);
        assert_eq!(d[2].size(), 12);
        assert!(d[2].is_eof());
        assert!(!d[0].is_eof());
        assert!(d[2].next().is_null());
        assert_eq!(d[0].next(), chain.head().wrapping_add(1));
        assert_eq!(d[1].buffer(), data.as_ptr().wrapping_add(MAX_DMA_LEN));
    }

    #[test]
    fn exact_multiple_has_no_trailing_empty_segment() {
        let data = vec![0u8; MAX_DMA_LEN];
        let mut chain = DescriptorChain::new();
        assert_eq!(chain.build_linear(data.as_ptr(), data.len()).unwrap(), 1);
        assert!(chain.descriptors()[0].is_eof());
    }

    #[test]
    fn strided_rows_advance_by_stride() {
        let image = vec![0u8; 16 * 16 * 2];
        let mut chain = DescriptorChain::new();
        let n = chain.build_strided(image.as_ptr(), 8, 4, 32).unwrap();
        assert_eq!(n, 4);
        for (i, d) in chain.descriptors().iter().enumerate() {
            assert_eq!(d.len(), 8);
            assert_eq!(d.buffer(), image.as_ptr().wrapping_add(i * 32));
            assert!(d.is_dma_owned());
        }
        assert!(chain.descriptors()[3].is_eof());
    }

    #[test]
    fn scatter_ring_links_back_to_head() {
        let rows = [[0u8; 6]; 3];
        let ptrs: Vec<*const u8> = rows.iter().map(|r| r.as_ptr()).collect();
        let mut chain = DescriptorChain::new();
        chain.build_scatter(&ptrs, 6, true).unwrap();
        let d = chain.descriptors();
        assert_eq!(d[2].next(), chain.head());
        assert!(!d[2].is_eof());
        assert_eq!(d[1].size(), 6);

        chain.build_scatter(&ptrs, 6, false).unwrap();
        assert!(chain.descriptors()[2].is_eof());
        assert!(chain.descriptors()[2].next().is_null());
    }

    #[test]
    fn capacity_never_shrinks() {
        let data = vec![0u8; MAX_DMA_LEN * 4];
        let mut chain = DescriptorChain::new();
        chain.build_linear(data.as_ptr(), data.len()).unwrap();
        assert_eq!(chain.capacity(), 4);
        chain.build_linear(data.as_ptr(), 100).unwrap();
        assert_eq!(chain.capacity(), 4);
        assert_eq!(chain.descriptors().len(), 1);
    }

    #[test]
    fn oversized_row_is_rejected() {
        let mut chain = DescriptorChain::new();
        let err = chain
            .build_strided(ptr::null(), MAX_DMA_LEN + 4, 2, MAX_DMA_LEN + 4)
            .unwrap_err();
        assert_eq!(err, DmaError::RowTooLong { len: MAX_DMA_LEN + 4 });
        assert_eq!(chain.build_linear(ptr::null(), 0), Err(DmaError::Empty));
    }
}
