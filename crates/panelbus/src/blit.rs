//! Rectangle transfers: image blits, read-back and on-panel copies

use embedded_hal::delay::DelayNs;
use panel_specs::{DepthConverter, Panel, PixelCopy, PixelRead};
use platform::dma_safety::{DIRECT_WRITE_LIMIT, SINGLE_SHOT_STAGING_LIMIT};
use platform::registers::BusRegisters;
use platform::Host;

use crate::dma::Source;
use crate::driver::PanelBus;
use crate::error::BusError;
use crate::transaction::ReadParams;

/// Inclusive end coordinate of a run of `len` starting at `start`.
fn last(start: u16, len: u16) -> u16 {
    start.saturating_add(len.saturating_sub(1))
}

fn too_small(needed: usize, got: usize) -> BusError {
    BusError::BufferTooSmall { needed, got }
}

impl<R, H, D, P> PanelBus<R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    // -----------------------------------------------------------------------
    // Image blits
    // -----------------------------------------------------------------------

    /// Draw a `w` x `h` image from `src` at `(x, y)`.
    ///
    /// `src` starts at its current cursor and must produce the current
    /// write format. Pixels matching the source's transparent key are left
    /// untouched on the panel.
    pub fn push_image<S: PixelCopy + ?Sized>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        src: &mut S,
    ) -> Result<(), BusError> {
        self.write_image(x, y, w, h, src, false)
    }

    /// As [`Self::push_image`], but sources already in the write format are
    /// sent by DMA straight from caller memory when a channel is available.
    pub fn push_image_dma<S: PixelCopy + ?Sized>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        src: &mut S,
    ) -> Result<(), BusError> {
        self.write_image(x, y, w, h, src, true)
    }

    fn write_image<S: PixelCopy + ?Sized>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        src: &mut S,
        use_dma: bool,
    ) -> Result<(), BusError> {
        if w == 0 || h == 0 || !self.attached() {
            return Ok(());
        }
        self.with_write(|s| {
            if src.has_transparent() {
                s.write_image_keyed(x, y, w, h, src, use_dma)
            } else if src.no_convert() {
                s.write_image_raw(x, y, w, h, src, use_dma)
            } else {
                s.write_image_converted(x, y, w, h, src)
            }
        })
    }

    /// Source already in wire format: send its bytes as they are.
    #[allow(clippy::arithmetic_side_effects)] // Safety: bounded by u16 geometry times <= 4 bytes per pixel
    fn write_image_raw<S: PixelCopy + ?Sized>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        src: &mut S,
        use_dma: bool,
    ) -> Result<(), BusError> {
        let Some(raw) = src.raw() else {
            return self.write_image_converted(x, y, w, h, src);
        };
        let bytes = usize::from(self.write_conv.bytes);
        let rows = usize::from(h);
        let row_len = usize::from(w) * bytes;
        let total = row_len * rows;
        let stride = raw.width * bytes;
        let data = raw
            .data
            .get(raw.y * stride + raw.x * bytes..)
            .unwrap_or_default();

        self.address_for_write(x, y, last(x, w), last(y, h))?;

        if use_dma {
            if let Some(dma) = self.dma.as_mut() {
                return if raw.width == usize::from(w) {
                    let block = data.get(..total).ok_or_else(|| too_small(total, data.len()))?;
                    dma.write_linear(&mut self.bus, block, Source::Caller)
                } else {
                    dma.write_strided(&mut self.bus, data, row_len, rows, stride)
                };
            }
        }

        if raw.width == usize::from(w) {
            let block = data.get(..total).ok_or_else(|| too_small(total, data.len()))?;
            let staged = self.dma.is_some()
                && total > DIRECT_WRITE_LIMIT
                && total <= SINGLE_SHOT_STAGING_LIMIT;
            if staged {
                let buf = self.staging.acquire(total)?;
                buf.copy_from_slice(block);
                return self
                    .bus
                    .write_bytes(self.dma.as_mut(), buf, true, Source::Staging);
            }
            return self.bus.write_bytes(None, block, false, Source::Caller);
        }

        for row in 0..rows {
            let start = row * stride;
            let line = data
                .get(start..start + row_len)
                .ok_or_else(|| too_small(start + row_len, data.len()))?;
            self.bus.write_bytes(None, line, false, Source::Caller)?;
        }
        Ok(())
    }

    /// Source needs conversion: through staging when DMA can overlap the
    /// next copy, otherwise streamed row by row.
    #[allow(clippy::arithmetic_side_effects)] // Safety: bounded by u16 geometry times <= 4 bytes per pixel
    fn write_image_converted<S: PixelCopy + ?Sized>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        src: &mut S,
    ) -> Result<(), BusError> {
        let bytes = usize::from(self.write_conv.bytes);
        let (cols, rows) = (usize::from(w), usize::from(h));
        let row_len = cols * bytes;
        let total = row_len * rows;
        let (src_x, src_y) = src.position();

        if self.dma.is_some() && total > DIRECT_WRITE_LIMIT {
            if src.width() == cols && total <= SINGLE_SHOT_STAGING_LIMIT {
                let buf = self.staging.acquire(total)?;
                src.copy(buf, 0, cols * rows);
                self.bus.leave_fill_mode()?;
                self.window.set(&mut self.bus, x, y, last(x, w), last(y, h))?;
                self.bus.write_cmd(self.opcodes.ramwr)?;
                return self
                    .bus
                    .write_bytes(self.dma.as_mut(), buf, true, Source::Staging);
            }
            self.address_for_write(x, y, last(x, w), last(y, h))?;
            for row in 0..rows {
                let buf = self.staging.acquire(row_len)?;
                src.copy(buf, 0, cols);
                self.bus
                    .write_bytes(self.dma.as_mut(), buf, true, Source::Staging)?;
                src.seek(src_x, src_y + row + 1);
            }
            return Ok(());
        }

        self.address_for_write(x, y, last(x, w), last(y, h))?;
        for row in 0..rows {
            self.bus.write_pixels(cols, self.write_conv.bytes, src)?;
            src.seek(src_x, src_y + row + 1);
        }
        Ok(())
    }

    /// Transparent key: one window and one write per opaque run.
    #[allow(clippy::arithmetic_side_effects)] // Safety: i < cols; run lengths bounded by cols
    #[allow(clippy::cast_possible_truncation)] // Safety: i and len are at most w, a u16
    fn write_image_keyed<S: PixelCopy + ?Sized>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        src: &mut S,
        use_dma: bool,
    ) -> Result<(), BusError> {
        let bytes = usize::from(self.write_conv.bytes);
        let cols = usize::from(w);
        let (src_x, src_y) = src.position();

        for row in 0..h {
            let yy = y.saturating_add(row);
            let mut i = 0;
            loop {
                i = src.skip(i, cols);
                if i >= cols {
                    break;
                }
                let buf = self.staging.acquire(cols * bytes)?;
                let len = src.copy(buf, 0, cols - i);
                if len == 0 {
                    break;
                }
                let xs = x.saturating_add(i as u16);
                self.bus.leave_fill_mode()?;
                self.window.set(&mut self.bus, xs, yy, last(xs, len as u16), yy)?;
                self.bus.write_cmd(self.opcodes.ramwr)?;
                let run = buf.get(..len * bytes).unwrap_or_default();
                self.bus
                    .write_bytes(self.dma.as_mut(), run, use_dma, Source::Staging)?;
                i += len;
            }
            src.seek(src_x, src_y + usize::from(row) + 1);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read-back
    // -----------------------------------------------------------------------

    /// Read a rectangle, converting through `conv` into `dst`.
    ///
    /// A panel that cannot be read (or no panel) yields zeros.
    pub fn read_rect<C: PixelRead + ?Sized>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        dst: &mut [u8],
        conv: &mut C,
    ) -> Result<(), BusError> {
        if w == 0 || h == 0 {
            return Ok(());
        }
        let params = match self.read_params() {
            Some(params) if self.is_readable() => params,
            _ => {
                dst.fill(0);
                return Ok(());
            }
        };
        let count = usize::from(w).saturating_mul(usize::from(h));
        let bytes = self.read_conv.bytes;
        self.with_write(|s| {
            s.bus.leave_fill_mode()?;
            s.window.set(&mut s.bus, x, y, last(x, w), last(y, h))?;
            s.bus.write_cmd(s.opcodes.ramrd)?;
            s.read_pixels_into(&params, count, bytes, dst, conv)
        })
    }

    /// Read a rectangle in the panel's read format.
    pub fn read_rect_raw(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        dst: &mut [u8],
    ) -> Result<(), BusError> {
        let depth = self.read_conv.depth;
        self.read_rect(x, y, w, h, dst, &mut DepthConverter::new(depth, depth))
    }

    /// Read-mode transfer of `count` pixels after RAMRD has been sent.
    fn read_pixels_into<C: PixelRead + ?Sized>(
        &mut self,
        params: &ReadParams,
        count: usize,
        bytes: u8,
        dst: &mut [u8],
        conv: &mut C,
    ) -> Result<(), BusError> {
        params.start(&mut self.bus)?;
        let result = self.read_after_start(params, count, bytes, dst, conv);
        let end = params.end(&mut self.bus);
        result?;
        end
    }

    fn read_after_start<C: PixelRead + ?Sized>(
        &mut self,
        params: &ReadParams,
        count: usize,
        bytes: u8,
        dst: &mut [u8],
        conv: &mut C,
    ) -> Result<(), BusError> {
        if params.dummy_bits != 0 {
            self.bus.read_data(params.dummy_bits)?;
        }
        if conv.no_convert() {
            let needed = count.saturating_mul(usize::from(bytes));
            let got = dst.len();
            let out = dst.get_mut(..needed).ok_or_else(|| too_small(needed, got))?;
            self.bus.read_bytes(out)
        } else {
            self.bus.read_pixels(count, bytes, dst, conv)
        }
    }

    // -----------------------------------------------------------------------
    // On-panel copy
    // -----------------------------------------------------------------------

    /// Copy the `w` x `h` rectangle at `(src_x, src_y)` to `(dst_x, dst_y)`.
    ///
    /// Works in single-column strips when the area is taller than wide and
    /// single-row strips otherwise, walking away from the destination so
    /// overlapping areas copy correctly. No-op on panels that cannot be read.
    #[allow(clippy::arithmetic_side_effects)] // Safety: i < len, so len - 1 - i never underflows
    pub fn copy_rect(
        &mut self,
        dst_x: u16,
        dst_y: u16,
        w: u16,
        h: u16,
        src_x: u16,
        src_y: u16,
    ) -> Result<(), BusError> {
        if w == 0 || h == 0 || !self.is_readable() {
            return Ok(());
        }
        let Some(params) = self.read_params() else {
            return Ok(());
        };
        let mut conv = DepthConverter::new(self.read_conv.depth, self.write_conv.depth);
        self.with_write(|s| {
            if w < h {
                let backwards = src_x < dst_x;
                for i in 0..w {
                    let col = if backwards { w - 1 - i } else { i };
                    let strip = Strip {
                        src: (src_x.saturating_add(col), src_y),
                        dst: (dst_x.saturating_add(col), dst_y),
                        size: (1, h),
                    };
                    s.copy_strip(&params, strip, &mut conv)?;
                }
            } else {
                let backwards = src_y < dst_y;
                for i in 0..h {
                    let row = if backwards { h - 1 - i } else { i };
                    let strip = Strip {
                        src: (src_x, src_y.saturating_add(row)),
                        dst: (dst_x, dst_y.saturating_add(row)),
                        size: (w, 1),
                    };
                    s.copy_strip(&params, strip, &mut conv)?;
                }
            }
            Ok(())
        })
    }

    fn copy_strip(
        &mut self,
        params: &ReadParams,
        strip: Strip,
        conv: &mut DepthConverter,
    ) -> Result<(), BusError> {
        let ((sx, sy), (dx, dy), (w, h)) = (strip.src, strip.dst, strip.size);
        let count = usize::from(w).saturating_mul(usize::from(h));
        let len = count.saturating_mul(usize::from(conv.dst_bytes()));
        let read_bytes = self.read_conv.bytes;

        let buf = self.staging.acquire(len)?;
        self.bus.leave_fill_mode()?;
        self.window.set(&mut self.bus, sx, sy, last(sx, w), last(sy, h))?;
        self.bus.write_cmd(self.opcodes.ramrd)?;

        params.start(&mut self.bus)?;
        let mut read = Ok(());
        if params.dummy_bits != 0 {
            read = self.bus.read_data(params.dummy_bits).map(|_| ());
        }
        if read.is_ok() {
            read = if conv.no_convert() {
                self.bus.read_bytes(buf)
            } else {
                self.bus.read_pixels(count, read_bytes, buf, conv)
            };
        }
        let end = params.end(&mut self.bus);
        read?;
        end?;

        self.window.set(&mut self.bus, dx, dy, last(dx, w), last(dy, h))?;
        self.bus.write_cmd(self.opcodes.ramwr)?;
        self.bus.write_bytes(None, buf, false, Source::Staging)
    }
}

/// One strip of a [`PanelBus::copy_rect`].
#[derive(Debug, Clone, Copy)]
struct Strip {
    src: (u16, u16),
    dst: (u16, u16),
    size: (u16, u16),
}
