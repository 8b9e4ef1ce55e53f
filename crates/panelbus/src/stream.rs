//! Pixel streaming engine
//!
//! Turns pixel counts and buffers into register-loaded transfers. The 64-byte
//! data buffer is used as two 32-byte halves: while one half is being
//! shifted out (or in), the CPU loads (or drains) the other, so long runs
//! stream without idle gaps between transfers.

use panel_specs::{PixelCopy, PixelRead};
use platform::dma_safety::{DIRECT_WRITE_LIMIT, HALF_BUFFER_BYTES, TRANSFER_BUFFER_BYTES};
use platform::registers::{
    BusRegisters, Reg, DATA_WORDS, HIGH_PART_WORD, SPI_USR_MISO_HIGHPART, SPI_USR_MOSI_HIGHPART,
};
use platform::Host;

use crate::bus::{word, RawBus};
use crate::dma::{DmaEngine, Source};
use crate::error::BusError;

/// First solid-fill burst: the three pattern words W0..W2.
const FIRST_FILL_BITS: u64 = 96;
/// Steady-state fill burst when whole pixels tile the 64-byte buffer; the
/// controller wraps around the buffer while shifting.
const RING_FILL_BITS: u64 = 2048;
/// Steady-state fill burst otherwise: 63 bytes, whole 1- and 3-byte pixels.
const TILED_FILL_BITS: u64 = 504;
/// One pattern period: whole pixels of every supported width.
const PATTERN_BYTES: usize = 12;
const PATTERN_WORDS: usize = PATTERN_BYTES / 4;

/// First word of the low or high half.
const fn half(high: bool) -> usize {
    if high {
        HIGH_PART_WORD as usize
    } else {
        0
    }
}

/// Bit length of `bytes`, saturating at the register range.
fn bits(bytes: usize) -> u32 {
    u32::try_from(bytes.saturating_mul(8)).unwrap_or(u32::MAX)
}

fn short_bits(bits: u64) -> u32 {
    u32::try_from(bits).unwrap_or(u32::MAX)
}

impl<R: BusRegisters, H: Host> RawBus<R, H> {
    // -----------------------------------------------------------------------
    // Solid fill
    // -----------------------------------------------------------------------

    /// Send `count` copies of the `bytes`-wide pixel `raw` at the current
    /// window. With `fill` the faster fill clock is selected for the run.
    #[allow(clippy::arithmetic_side_effects)] // Safety: remaining only ever drops by amounts <= itself
    pub(crate) fn push_block(
        &mut self,
        raw: u32,
        bytes: u8,
        count: u32,
        fill: bool,
    ) -> Result<(), BusError> {
        let width = usize::from(bytes.clamp(1, 4));
        let pixel_bits = u32::from(bytes.clamp(1, 4)) * 8;
        match count {
            0 => return Ok(()),
            1 => return self.write_data(raw, pixel_bits),
            _ => {}
        }
        let px = raw.to_le_bytes();
        let mut pattern = [0u8; PATTERN_BYTES];
        for (i, b) in pattern.iter_mut().enumerate() {
            *b = px.get(i % width).copied().unwrap_or(0);
        }
        let mut words = [0u32; PATTERN_WORDS];
        for (w, chunk) in words.iter_mut().zip(pattern.chunks_exact(4)) {
            *w = <[u8; 4]>::try_from(chunk).map_or(0, u32::from_le_bytes);
        }

        let mut remaining = u64::from(count) * u64::from(pixel_bits);
        let first = remaining.min(FIRST_FILL_BITS);
        self.dc_h()?;
        for (i, w) in words.iter().enumerate() {
            self.regs.write(word(i), *w);
        }
        self.set_write_len(short_bits(first));
        if fill {
            self.fill_clock();
        }
        self.exec();
        remaining -= first;
        if remaining == 0 {
            return Ok(());
        }

        for i in PATTERN_WORDS..DATA_WORDS {
            let w = words.get(i % PATTERN_WORDS).copied().unwrap_or(0);
            self.regs.write(word(i), w);
        }
        let limit = if TRANSFER_BUFFER_BYTES % width == 0 {
            RING_FILL_BITS
        } else {
            TILED_FILL_BITS
        };
        let head = remaining % limit;
        if head != 0 {
            self.wait_idle()?;
            self.set_write_len(short_bits(head));
            self.exec();
            remaining -= head;
            if remaining == 0 {
                return Ok(());
            }
        }
        self.wait_idle()?;
        self.set_write_len(short_bits(limit));
        self.exec();
        remaining -= limit;
        while remaining != 0 {
            self.host.yield_now();
            self.wait_idle()?;
            self.exec();
            remaining -= limit;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Write ping-pong
    // -----------------------------------------------------------------------

    /// Stream `units` items of `unit_bytes` each; `fill(buf, n)` writes the
    /// next `n` items to the front of `buf`.
    ///
    /// The first transfer carries the remainder so that every later one is
    /// full, and its half is chosen so the last transfer lands in the low
    /// half, leaving USER without the high-part flag.
    #[allow(clippy::arithmetic_side_effects)] // Safety: units >= 1, limit >= 1, len <= units
    fn stream_out(
        &mut self,
        units: usize,
        unit_bytes: usize,
        mut fill: impl FnMut(&mut [u8], usize),
    ) -> Result<(), BusError> {
        if units == 0 || unit_bytes == 0 || unit_bytes > HALF_BUFFER_BYTES {
            return Ok(());
        }
        let limit = HALF_BUFFER_BYTES / unit_bytes;
        let rounds = (units - 1) / limit;
        let mut high = rounds & 1 != 0;
        let mut len = units - rounds * limit;
        let user = self.regs.read(Reg::User) & !SPI_USR_MOSI_HIGHPART;
        let mut chunk = [0u8; HALF_BUFFER_BYTES];

        fill(&mut chunk, len);
        self.dc_h()?;
        self.set_write_len(bits(len * unit_bytes));
        self.load_words(half(high), chunk.get(..len * unit_bytes).unwrap_or_default());
        if high {
            self.regs.write(Reg::User, user | SPI_USR_MOSI_HIGHPART);
        }
        self.exec();

        for _ in 0..rounds {
            fill(&mut chunk, limit);
            high = !high;
            self.load_words(half(high), chunk.get(..limit * unit_bytes).unwrap_or_default());
            self.wait_idle()?;
            if len != limit {
                len = limit;
                self.set_write_len(bits(limit * unit_bytes));
            }
            let user = if high { user | SPI_USR_MOSI_HIGHPART } else { user };
            self.regs.write(Reg::User, user);
            self.exec();
        }
        Ok(())
    }

    /// Convert and send `count` pixels from `src`.
    pub(crate) fn write_pixels<S: PixelCopy + ?Sized>(
        &mut self,
        count: usize,
        bytes: u8,
        src: &mut S,
    ) -> Result<(), BusError> {
        self.stream_out(count, usize::from(bytes), |buf, n| {
            src.copy(buf, 0, n);
        })
    }

    /// Send raw wire bytes.
    ///
    /// Up to one full buffer goes out in a single transfer. Longer data goes
    /// through DMA when `use_dma` is set and a channel exists, otherwise
    /// through the half-buffer ping-pong.
    pub(crate) fn write_bytes(
        &mut self,
        dma: Option<&mut DmaEngine>,
        data: &[u8],
        use_dma: bool,
        source: Source,
    ) -> Result<(), BusError> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() <= DIRECT_WRITE_LIMIT {
            self.dc_h()?;
            self.set_write_len(bits(data.len()));
            self.load_words(0, data);
            self.exec();
            return Ok(());
        }
        if let (true, Some(dma)) = (use_dma, dma) {
            return dma.write_linear(self, data, source);
        }
        let mut rest = data;
        self.stream_out(data.len(), 1, |buf, n| {
            let (head, tail) = rest.split_at(n.min(rest.len()));
            if let Some(dst) = buf.get_mut(..head.len()) {
                dst.copy_from_slice(head);
            }
            rest = tail;
        })
    }

    // -----------------------------------------------------------------------
    // Read ping-pong
    // -----------------------------------------------------------------------

    /// Clock in `units` items of `unit_bytes`, at most `limit` per transfer;
    /// `drain(bytes, n)` receives each completed chunk while the next one is
    /// already being clocked in.
    #[allow(clippy::arithmetic_side_effects)] // Safety: next <= remaining; n * unit_bytes <= 32
    fn stream_in(
        &mut self,
        units: usize,
        unit_bytes: usize,
        limit: usize,
        mut drain: impl FnMut(&[u8], usize),
    ) -> Result<(), BusError> {
        if units == 0 || unit_bytes == 0 || unit_bytes > HALF_BUFFER_BYTES {
            return Ok(());
        }
        let limit = limit.clamp(1, HALF_BUFFER_BYTES / unit_bytes);
        let user = self.regs.read(Reg::User) & !SPI_USR_MISO_HIGHPART;
        let first = units.min(limit);
        self.wait_idle()?;
        self.set_read_len(bits(first * unit_bytes));
        self.exec();

        let mut remaining = units - first;
        let mut in_flight = Some((false, first));
        let mut chunk = [0u8; HALF_BUFFER_BYTES];
        while let Some((high, n)) = in_flight {
            self.wait_idle()?;
            if remaining == 0 {
                self.regs.write(Reg::User, user);
                in_flight = None;
            } else {
                let next = remaining.min(limit);
                if next != n {
                    self.set_read_len(bits(next * unit_bytes));
                }
                let next_user = if high { user } else { user | SPI_USR_MISO_HIGHPART };
                self.regs.write(Reg::User, next_user);
                self.exec();
                remaining -= next;
                in_flight = Some((!high, next));
            }
            let out = chunk.get_mut(..n * unit_bytes).unwrap_or_default();
            self.unload_words(half(high), out);
            drain(out, n);
        }
        Ok(())
    }

    /// Read `dst.len()` raw bytes.
    #[allow(clippy::arithmetic_side_effects)] // Safety: offset + len <= dst.len() by construction
    pub(crate) fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), BusError> {
        let mut offset = 0;
        self.stream_in(dst.len(), 1, HALF_BUFFER_BYTES, |src, n| {
            if let Some(out) = dst.get_mut(offset..offset + n) {
                out.copy_from_slice(src.get(..n).unwrap_or_default());
            }
            offset += n;
        })
    }

    /// Read `count` pixels of `bytes` each and convert them into `dst`.
    #[allow(clippy::arithmetic_side_effects)] // Safety: index advances by at most n per chunk
    pub(crate) fn read_pixels<C: PixelRead + ?Sized>(
        &mut self,
        count: usize,
        bytes: u8,
        dst: &mut [u8],
        conv: &mut C,
    ) -> Result<(), BusError> {
        let mut index = 0;
        self.stream_in(count, usize::from(bytes), HALF_BUFFER_BYTES, |src, n| {
            index = conv.read(src, dst, index, index + n);
        })
    }
}
