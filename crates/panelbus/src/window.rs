//! Window addressing
//!
//! The column and row extents last sent to the panel are cached separately;
//! an address command is only emitted for the axis that changed. Any change
//! of coordinate transform (rotation, depth, panel) must [`Window::invalidate`]
//! the cache.

use panel_specs::{AddressWidth, Panel};
use platform::registers::{BusRegisters, Reg};
use platform::Host;

use crate::bus::RawBus;
use crate::error::BusError;

type Packer = fn(u16, u16) -> u32;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Window {
    cols: Option<(u16, u16)>,
    rows: Option<(u16, u16)>,
    col_start: u16,
    row_start: u16,
    caset: u8,
    raset: u8,
    width: AddressWidth,
    pack: Packer,
}

impl Default for Window {
    fn default() -> Self {
        let width = AddressWidth::default();
        Self {
            cols: None,
            rows: None,
            col_start: 0,
            row_start: 0,
            caset: 0x2A,
            raset: 0x2B,
            width,
            pack: width.packer(),
        }
    }
}

impl Window {
    /// Addressing taken from `panel` at its current rotation.
    pub(crate) fn from_panel<P: Panel + ?Sized>(panel: &P) -> Self {
        let opcodes = panel.opcodes();
        let width = panel.address_width();
        Self {
            cols: None,
            rows: None,
            col_start: panel.col_start(),
            row_start: panel.row_start(),
            caset: opcodes.caset,
            raset: opcodes.raset,
            width,
            pack: width.packer(),
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.cols = None;
        self.rows = None;
    }

    /// Extents currently held by the panel, if known.
    #[cfg(test)]
    pub(crate) fn cached(&self) -> (Option<(u16, u16)>, Option<(u16, u16)>) {
        (self.cols, self.rows)
    }

    /// Address `(xs, ys)..=(xe, ye)`, sending only the axes that changed.
    pub(crate) fn set<R: BusRegisters, H: Host>(
        &mut self,
        bus: &mut RawBus<R, H>,
        xs: u16,
        ys: u16,
        xe: u16,
        ye: u16,
    ) -> Result<(), BusError> {
        if self.cols != Some((xs, xe)) {
            bus.write_cmd(self.caset)?;
            let packed = (self.pack)(
                xs.wrapping_add(self.col_start),
                xe.wrapping_add(self.col_start),
            );
            self.write_addr(bus, packed)?;
            self.cols = Some((xs, xe));
        }
        if self.rows != Some((ys, ye)) {
            bus.write_cmd(self.raset)?;
            let packed = (self.pack)(
                ys.wrapping_add(self.row_start),
                ye.wrapping_add(self.row_start),
            );
            self.write_addr(bus, packed)?;
            self.rows = Some((ys, ye));
        }
        Ok(())
    }

    /// Send a packed extent. On 16-bit buses each byte rides in the high
    /// half of its own frame.
    #[allow(clippy::arithmetic_side_effects)] // Safety: bytes shifted within 32 bits
    fn write_addr<R: BusRegisters, H: Host>(
        &self,
        bus: &mut RawBus<R, H>,
        packed: u32,
    ) -> Result<(), BusError> {
        let bits = self.width.bits();
        bus.dc_h()?;
        if bus.is_wide() {
            let b = packed.to_le_bytes();
            let lo = u32::from(b[0]) << 8 | u32::from(b[1]) << 24;
            let hi = u32::from(b[2]) << 8 | u32::from(b[3]) << 24;
            bus.regs.write(Reg::W(0), lo);
            bus.regs.write(Reg::W(1), hi);
            bus.set_write_len(bits.saturating_mul(2));
        } else {
            bus.regs.write(Reg::W(0), packed);
            bus.set_write_len(bits);
        }
        bus.exec();
        Ok(())
    }
}
