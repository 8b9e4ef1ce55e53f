//! Pixel copy collaborators
//!
//! The streaming engine never walks caller images itself. It asks a
//! [`PixelCopy`] to convert a run of pixels into a wire-format buffer, or to
//! skip a run of transparent ones, and a [`PixelRead`] to turn bytes read
//! back from the panel into the caller's format.

use crate::color::{ColorConverter, ColorDepth};

/// Contiguous source rows already in wire format.
#[derive(Debug, Clone, Copy)]
pub struct RawImage<'a> {
    /// Source bytes, row-major
    pub data: &'a [u8],
    /// Source row length in pixels
    pub width: usize,
    /// Cursor column
    pub x: usize,
    /// Cursor row
    pub y: usize,
}

/// Write-side pixel source.
pub trait PixelCopy {
    /// Source pixels are already in the destination wire format.
    fn no_convert(&self) -> bool;

    /// A transparent key colour is active.
    fn has_transparent(&self) -> bool;

    /// Raw view of the source, available when [`Self::no_convert`] holds.
    fn raw(&self) -> Option<RawImage<'_>>;

    /// Source row length in pixels.
    fn width(&self) -> usize;

    /// Convert pixels into `dst` slots `index..last`, advancing the cursor.
    ///
    /// Returns the next destination index. With a transparent key this stops
    /// early at the first transparent pixel.
    fn copy(&mut self, dst: &mut [u8], index: usize, last: usize) -> usize;

    /// Advance over transparent pixels from `index` towards `last`.
    ///
    /// Returns the index of the first pixel that must be drawn, or `last`.
    fn skip(&mut self, index: usize, last: usize) -> usize;

    /// Cursor position.
    fn position(&self) -> (usize, usize);

    /// Move the cursor.
    fn seek(&mut self, x: usize, y: usize);
}

/// Read-side converter from panel wire bytes into a caller buffer.
pub trait PixelRead {
    /// Caller format equals the panel's read format.
    fn no_convert(&self) -> bool;

    /// Convert whole pixels of `src` into `dst` slots `index..last`.
    ///
    /// Returns the next destination index.
    fn read(&mut self, src: &[u8], dst: &mut [u8], index: usize, last: usize) -> usize;
}

/// Image held in memory in any [`ColorDepth`].
#[derive(Debug, Clone)]
pub struct ImageSource<'a> {
    data: &'a [u8],
    width: usize,
    src: ColorConverter,
    dst: ColorConverter,
    transparent: Option<u32>,
    x: usize,
    y: usize,
}

impl<'a> ImageSource<'a> {
    /// `data` holds rows of `width` pixels in `src_depth`; output is `dst_depth`.
    #[must_use]
    pub fn new(data: &'a [u8], width: usize, src_depth: ColorDepth, dst_depth: ColorDepth) -> Self {
        Self {
            data,
            width,
            src: ColorConverter::new(src_depth),
            dst: ColorConverter::new(dst_depth),
            transparent: None,
            x: 0,
            y: 0,
        }
    }

    /// Treat source pixels whose raw value equals `raw` as transparent.
    #[must_use]
    pub fn with_transparent(mut self, raw: u32) -> Self {
        self.transparent = Some(raw);
        self
    }

    /// Start reading at column `x`, row `y` of the source.
    #[must_use]
    pub fn with_origin(mut self, x: usize, y: usize) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Rows available in the source.
    #[must_use]
    pub fn rows(&self) -> usize {
        let row_bytes = self.width.saturating_mul(usize::from(self.src.bytes));
        self.data.len().checked_div(row_bytes).unwrap_or(0)
    }

    fn pixel(&self, x: usize, y: usize) -> u32 {
        let offset = y
            .saturating_mul(self.width)
            .saturating_add(x)
            .saturating_mul(usize::from(self.src.bytes));
        self.data
            .get(offset..)
            .map_or(0, |bytes| self.src.read_raw(bytes))
    }
}

impl PixelCopy for ImageSource<'_> {
    fn no_convert(&self) -> bool {
        self.src.depth == self.dst.depth
    }

    fn has_transparent(&self) -> bool {
        self.transparent.is_some()
    }

    fn raw(&self) -> Option<RawImage<'_>> {
        self.no_convert().then_some(RawImage {
            data: self.data,
            width: self.width,
            x: self.x,
            y: self.y,
        })
    }

    fn width(&self) -> usize {
        self.width
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: i < last; x bounded by image width in practice, saturating elsewhere
    fn copy(&mut self, dst: &mut [u8], index: usize, last: usize) -> usize {
        let stride = usize::from(self.dst.bytes);
        for i in index..last {
            let raw = self.pixel(self.x, self.y);
            if self.transparent == Some(raw) {
                return i;
            }
            let out = self.dst.convert_from(&self.src, raw);
            if let Some(slot) = dst.get_mut(i * stride..) {
                self.dst.write_raw(out, slot);
            }
            self.x += 1;
        }
        last
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: index < last
    fn skip(&mut self, mut index: usize, last: usize) -> usize {
        let Some(key) = self.transparent else {
            return index;
        };
        while index < last && self.pixel(self.x, self.y) == key {
            self.x += 1;
            index += 1;
        }
        index
    }

    fn position(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    fn seek(&mut self, x: usize, y: usize) {
        self.x = x;
        self.y = y;
    }
}

/// Converts panel read-back bytes from one depth to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthConverter {
    from: ColorConverter,
    to: ColorConverter,
}

impl DepthConverter {
    /// Panel reads `from`; caller wants `to`.
    #[must_use]
    pub const fn new(from: ColorDepth, to: ColorDepth) -> Self {
        Self {
            from: ColorConverter::new(from),
            to: ColorConverter::new(to),
        }
    }

    /// Bytes per destination pixel.
    #[must_use]
    pub const fn dst_bytes(&self) -> u8 {
        self.to.bytes
    }
}

impl PixelRead for DepthConverter {
    fn no_convert(&self) -> bool {
        self.from.depth == self.to.depth
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: i < last, offsets checked with get()
    fn read(&mut self, src: &[u8], dst: &mut [u8], index: usize, last: usize) -> usize {
        let sb = usize::from(self.from.bytes);
        let db = usize::from(self.to.bytes);
        for (n, i) in (index..last).enumerate() {
            let Some(bytes) = src.get(n * sb..) else {
                return i;
            };
            let raw = self.to.convert_from(&self.from, self.from.read_raw(bytes));
            if let Some(slot) = dst.get_mut(i * db..) {
                self.to.write_raw(raw, slot);
            }
        }
        last
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn rgb565_row(pixels: &[u16]) -> std::vec::Vec<u8> {
        pixels.iter().flat_map(|p| p.to_be_bytes()).collect()
    }

    #[test]
    fn copy_without_conversion_preserves_bytes() {
        let data = rgb565_row(&[0x1234, 0x5678, 0x9ABC]);
        let mut src = ImageSource::new(&data, 3, ColorDepth::Rgb565, ColorDepth::Rgb565);
        assert!(src.no_convert());
        let mut dst = [0u8; 6];
        assert_eq!(src.copy(&mut dst, 0, 3), 3);
        assert_eq!(&dst[..], &data[..]);
        assert_eq!(src.position(), (3, 0));
    }

    #[test]
    fn copy_converts_depth() {
        let data = [0xFF, 0x00, 0x00];
        let mut src = ImageSource::new(&data, 1, ColorDepth::Rgb888, ColorDepth::Rgb565);
        assert!(!src.no_convert());
        assert!(src.raw().is_none());
        let mut dst = [0u8; 2];
        src.copy(&mut dst, 0, 1);
        assert_eq!(dst, [0xF8, 0x00]);
    }

    #[test]
    fn copy_stops_at_transparent_pixel() {
        let data = rgb565_row(&[1, 2, 0, 0, 3]);
        let key = u32::from(0u16);
        let mut src =
            ImageSource::new(&data, 5, ColorDepth::Rgb565, ColorDepth::Rgb565).with_transparent(key);
        let mut dst = [0u8; 10];
        assert_eq!(src.skip(0, 5), 0);
        assert_eq!(src.copy(&mut dst, 0, 5), 2);
        assert_eq!(src.skip(2, 5), 4);
        assert_eq!(src.copy(&mut dst, 0, 1), 1);
        assert_eq!(src.position(), (5, 0));
    }

    #[test]
    fn origin_and_seek_select_rows() {
        let data = rgb565_row(&[1, 2, 3, 4]);
        let mut src =
            ImageSource::new(&data, 2, ColorDepth::Rgb565, ColorDepth::Rgb565).with_origin(1, 1);
        assert_eq!(src.rows(), 2);
        let raw = src.raw().unwrap();
        assert_eq!((raw.x, raw.y, raw.width), (1, 1, 2));
        let mut dst = [0u8; 2];
        src.copy(&mut dst, 0, 1);
        assert_eq!(dst, [0, 4]);
        src.seek(0, 0);
        src.copy(&mut dst, 0, 1);
        assert_eq!(dst, [0, 1]);
    }

    #[test]
    fn out_of_range_source_reads_black() {
        let data = [0xFFu8; 2];
        let mut src = ImageSource::new(&data, 1, ColorDepth::Rgb565, ColorDepth::Rgb565);
        let mut dst = [0xAAu8; 4];
        src.copy(&mut dst, 0, 2);
        assert_eq!(dst, [0xFF, 0xFF, 0, 0]);
    }

    #[test]
    fn depth_converter_reads_rgb888_into_rgb565() {
        let mut conv = DepthConverter::new(ColorDepth::Rgb888, ColorDepth::Rgb565);
        assert!(!conv.no_convert());
        let src = [0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF];
        let mut dst = [0u8; 4];
        assert_eq!(conv.read(&src, &mut dst, 0, 2), 2);
        assert_eq!(dst, [0xF8, 0x00, 0x00, 0x1F]);
        assert_eq!(conv.dst_bytes(), 2);
    }
}
