//! `embedded-graphics` integration
//!
//! Pixels and fills are clipped to the panel here; the driver calls below
//! draw wherever they are told.

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_hal::delay::DelayNs;
use panel_specs::Panel;
use platform::registers::BusRegisters;
use platform::Host;

use crate::driver::PanelBus;
use crate::error::BusError;

/// `0xRRGGBB` for `color`.
#[allow(clippy::arithmetic_side_effects)] // Safety: 8-bit channels shifted within 24 bits
fn rgb888(color: Rgb888) -> u32 {
    u32::from(color.r()) << 16 | u32::from(color.g()) << 8 | u32::from(color.b())
}

/// Clipped rectangle as `(x, y, w, h)` panel coordinates.
fn to_panel(area: &Rectangle) -> Option<(u16, u16, u16, u16)> {
    area.bottom_right()?;
    Some((
        u16::try_from(area.top_left.x).ok()?,
        u16::try_from(area.top_left.y).ok()?,
        u16::try_from(area.size.width).ok()?,
        u16::try_from(area.size.height).ok()?,
    ))
}

impl<R, H, D, P> OriginDimensions for PanelBus<R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    fn size(&self) -> Size {
        Size::new(u32::from(self.width()), u32::from(self.height()))
    }
}

impl<R, H, D, P> DrawTarget for PanelBus<R, H, D, P>
where
    R: BusRegisters,
    H: Host,
    D: DelayNs,
    P: Panel,
{
    type Color = Rgb888;
    type Error = BusError;

    /// All pixels are drawn inside one session.
    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bounds = self.bounding_box();
        self.with_write(|lcd| {
            for Pixel(point, color) in pixels {
                if !bounds.contains(point) {
                    continue;
                }
                let (Ok(x), Ok(y)) = (u16::try_from(point.x), u16::try_from(point.y)) else {
                    continue;
                };
                lcd.set_color(rgb888(color));
                lcd.draw_pixel(x, y)?;
            }
            Ok(())
        })
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let clipped = area.intersection(&self.bounding_box());
        let Some((x, y, w, h)) = to_panel(&clipped) else {
            return Ok(());
        };
        self.set_color(rgb888(color));
        self.fill_rect(x, y, w, h)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.set_color(rgb888(color));
        self.fill_rect(0, 0, self.width(), self.height())
    }
}
